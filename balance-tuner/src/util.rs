use anyhow::{Result, anyhow, bail};
use regex::Regex;
use std::sync::OnceLock;

/// A `key=value` pair from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub key: String,
    pub value: f64,
}

impl Assignment {
    /// Split `Owner.stat` keys such as `Brute.health`.
    pub fn owner_and_stat(&self) -> Result<(&str, &str)> {
        self.key
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("expected NAME.STAT=VALUE, got '{}'", self.key))
    }
}

fn assignment_regex() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^\s*([A-Za-z][A-Za-z0-9_.]*)\s*=\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*$",
            )
        })
        .as_ref()
        .map_err(|err| anyhow!("assignment pattern: {err}"))
}

pub fn parse_assignment(raw: &str) -> Result<Assignment> {
    let Some(captures) = assignment_regex()?.captures(raw) else {
        bail!("expected KEY=NUMBER, got '{raw}'");
    };
    let value: f64 = captures[2].parse()?;
    Ok(Assignment {
        key: captures[1].to_string(),
        value,
    })
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameter_paths() {
        let parsed = parse_assignment("enemy.archetypes.Brute.health = 1.25").unwrap();
        assert_eq!(parsed.key, "enemy.archetypes.Brute.health");
        assert!((parsed.value - 1.25).abs() < f64::EPSILON);
        assert_eq!(parsed.owner_and_stat().unwrap(), ("enemy.archetypes.Brute", "health"));
    }

    #[test]
    fn accepts_signs_and_exponents() {
        assert!((parse_assignment("x=-.5").unwrap().value + 0.5).abs() < f64::EPSILON);
        assert!((parse_assignment("x=2e-3").unwrap().value - 0.002).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_assignment("health").is_err());
        assert!(parse_assignment("=1.0").is_err());
        assert!(parse_assignment("health=lots").is_err());
        assert!(parse_assignment("1abc=2").is_err());
    }

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }
}
