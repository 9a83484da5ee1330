//! Command policy: allow/deny regex lists checked before a command ever runs
//! (§4.1).

use regex::Regex;
use zace_core::AppError;

#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl CommandPolicy {
    pub fn new(allow_patterns: &[String], deny_patterns: &[String]) -> Result<Self, regex::Error> {
        let allow = allow_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<_, _>>()?;
        let deny = deny_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<_, _>>()?;
        Ok(Self { allow, deny })
    }

    /// A deny match fails immediately. If any allow pattern is configured,
    /// the command must match at least one of them.
    pub fn check(&self, command: &str) -> Result<(), AppError> {
        if let Some(m) = self.deny.iter().find(|re| re.is_match(command)) {
            return Err(AppError::PolicyBlock(format!(
                "command matches deny pattern '{}'",
                m.as_str()
            )));
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|re| re.is_match(command)) {
            return Err(AppError::PolicyBlock(
                "command does not match any allow pattern".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_pattern_blocks() {
        let policy = CommandPolicy::new(&[], &["rm -rf /".to_string()]).unwrap();
        assert!(policy.check("rm -rf / --no-preserve-root").is_err());
        assert!(policy.check("ls").is_ok());
    }

    #[test]
    fn allow_list_is_exclusive_when_present() {
        let policy = CommandPolicy::new(&["^git ".to_string()], &[]).unwrap();
        assert!(policy.check("git status").is_ok());
        assert!(policy.check("curl evil.example").is_err());
    }

    #[test]
    fn empty_allow_list_permits_everything_not_denied() {
        let policy = CommandPolicy::new(&[], &[]).unwrap();
        assert!(policy.check("anything goes").is_ok());
    }
}
