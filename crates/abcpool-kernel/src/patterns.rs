//! Ordered regex rule sets for classifying simulator column names.
//!
//! The built-in tables mirror the column vocabulary of the coalescent
//! simulator: parameter columns are prefixed `PRI.`, summary-statistic
//! columns carry statistic names (`pi.N`, `wattTheta.N`, ...), and
//! `PRI.numTauClass` is a dummy column the legacy rejection reader expects
//! but no analysis consumes.

use abcpool_types::{Error, Result};
use regex::Regex;

/// One classification rule: a column name matches when `matches` accepts
/// it and the optional `unless` regex does not.
///
/// The regex crate has no lookahead, so exclusions that the original
/// pattern tables expressed as `(?!...)` live in a second regex evaluated
/// on the same name.
#[derive(Debug, Clone)]
pub struct Rule {
    matches: Regex,
    unless: Option<Regex>,
}

impl Rule {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            matches: compile(pattern)?,
            unless: None,
        })
    }

    pub fn with_exclusion(pattern: &str, unless: &str) -> Result<Self> {
        Ok(Self {
            matches: compile(pattern)?,
            unless: Some(compile(unless)?),
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.matches.is_match(name) && !self.unless.as_ref().is_some_and(|u| u.is_match(name))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::Configuration(format!("invalid column rule {pattern:?}: {e}")))
}

/// Ordered rule lists per semantic category.
///
/// Classification checks them first-match-wins in the fixed order
/// parameter → stat → dummy. An empty `stat` list means "every
/// non-parameter column is a stat" (see [`RuleSet::effective_stat_rules`]).
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub parameter: Vec<Rule>,
    pub stat: Vec<Rule>,
    pub dummy: Vec<Rule>,
}

impl RuleSet {
    /// The simulator's default vocabulary: `PRI.*` parameters (minus the
    /// dummy), the four default statistics, and the dummy column.
    pub fn simulator_defaults() -> Result<Self> {
        Ok(Self {
            parameter: parameter_rules()?,
            stat: default_stat_rules()?,
            dummy: dummy_rules()?,
        })
    }

    /// Default parameter and dummy rules with caller-supplied stat rules.
    pub fn with_stat_rules(stat: Vec<Rule>) -> Result<Self> {
        Ok(Self {
            parameter: parameter_rules()?,
            stat,
            dummy: dummy_rules()?,
        })
    }

    /// The stat rules classification actually uses: the explicit list, or
    /// the all-stats fallback when none were supplied.
    pub fn effective_stat_rules(&self) -> Result<Vec<Rule>> {
        if self.stat.is_empty() {
            all_stat_rules()
        } else {
            Ok(self.stat.clone())
        }
    }
}

/// Parameter columns: everything under the `PRI.` prefix except the dummy.
pub fn parameter_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::with_exclusion(
        r"^PRI\.\S+$",
        r"^PRI\.numTauClass$",
    )?])
}

/// The default summary statistics reported per taxon pair.
pub fn default_stat_rules() -> Result<Vec<Rule>> {
    Ok(vec![
        Rule::new(r"^pi\.\d+$")?,
        Rule::new(r"^wattTheta\.\d+$")?,
        Rule::new(r"^pi\.net\.\d+$")?,
        Rule::new(r"^tajD\.denom\.\d+$")?,
    ])
}

/// Fallback when no explicit stat rules are supplied: any column not in
/// the parameter namespace counts as a statistic.
pub fn all_stat_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::with_exclusion(r"^\S+$", r"^PRI")?])
}

/// The dummy column the legacy rejection format drags along.
pub fn dummy_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.numTauClass$")?])
}

/// Model-index column, present when several candidate models are mixed.
pub fn model_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.model$")?])
}

/// Per-pair divergence-time columns.
pub fn tau_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.t\.\d+$")?])
}

/// Number of distinct divergence events.
pub fn psi_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.Psi$")?])
}

/// Mean divergence time across pairs.
pub fn mean_tau_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.E\.t$")?])
}

/// Dispersion of divergence times.
pub fn omega_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.omega$")?])
}

/// Ancestral-population mutation-rate columns.
pub fn ancestral_theta_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.aTheta\.\d+$")?])
}

/// Descendant-population mutation-rate columns.
pub fn descendant_theta_rules() -> Result<Vec<Rule>> {
    Ok(vec![Rule::new(r"^PRI\.d[12]Theta\.\d+$")?])
}

/// Build stat rules from user-supplied statistic prefixes.
///
/// A prefix selects the numbered family it names: `pi` matches `pi.1` but
/// not `pi.net.1`; give `pi.net` explicitly for the latter. Matching is
/// case-insensitive when `ignore_case` is set.
pub fn rules_from_prefixes(prefixes: &[String], ignore_case: bool) -> Result<Vec<Rule>> {
    let mut rules = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let mut p = prefix.clone();
        if !p.ends_with('.') {
            p.push('.');
        }
        let flag = if ignore_case { "(?i)" } else { "" };
        rules.push(Rule::new(&format!(r"{flag}^{}\d+$", regex::escape(&p)))?);
    }
    Ok(rules)
}
