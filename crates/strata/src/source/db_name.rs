//! Database name grammar: `ENV;GROUP;NAME`.
//!
//! The environment tag gates destructive operations: only DEV, USER, and
//! TEST databases may be dropped. `CUSTOM` names carry an empty group and a
//! literal database name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SourceError;

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '.', '"', '$', '*', '<', '>', ':', '|', '?'];
const MAX_LEN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvKind {
    Prod,
    Uat,
    Dev,
    User,
    Test,
    Custom,
}

impl EnvKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvKind::Prod => "PROD",
            EnvKind::Uat => "UAT",
            EnvKind::Dev => "DEV",
            EnvKind::User => "USER",
            EnvKind::Test => "TEST",
            EnvKind::Custom => "CUSTOM",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PROD" => Some(EnvKind::Prod),
            "UAT" => Some(EnvKind::Uat),
            "DEV" => Some(EnvKind::Dev),
            "USER" => Some(EnvKind::User),
            "TEST" => Some(EnvKind::Test),
            "CUSTOM" => Some(EnvKind::Custom),
            _ => None,
        }
    }

    /// Whether `delete_db` is permitted against this environment.
    pub fn allows_drop(self) -> bool {
        matches!(self, EnvKind::Dev | EnvKind::User | EnvKind::Test)
    }
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed, validated database name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbName {
    env: EnvKind,
    group: String,
    name: String,
}

impl DbName {
    pub fn new(env: EnvKind, group: &str, name: &str) -> Result<Self, SourceError> {
        let raw = format!("{env};{group};{name}");
        Self::validate(&raw, env, group, name)?;
        Ok(Self {
            env,
            group: group.to_string(),
            name: name.to_string(),
        })
    }

    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let invalid = |reason: &str| SourceError::DbName {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };
        let mut segments = raw.split(';');
        let (env, group, name) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(env), Some(group), Some(name), None) => (env, group, name),
            _ => return Err(invalid("expected ENV;GROUP;NAME")),
        };
        let env = EnvKind::parse(env)
            .ok_or_else(|| invalid("unknown environment tag"))?;
        Self::validate(raw, env, group, name)?;
        Ok(Self {
            env,
            group: group.to_string(),
            name: name.to_string(),
        })
    }

    fn validate(raw: &str, env: EnvKind, group: &str, name: &str) -> Result<(), SourceError> {
        let invalid = |reason: String| SourceError::DbName {
            raw: raw.to_string(),
            reason,
        };
        if raw.len() > MAX_LEN {
            return Err(invalid(format!("longer than {MAX_LEN} chars")));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| FORBIDDEN_CHARS.contains(c) || c.is_whitespace())
        {
            return Err(invalid(format!("contains forbidden character `{bad}`")));
        }
        match env {
            EnvKind::Custom => {
                if !group.is_empty() {
                    return Err(invalid("CUSTOM names must have an empty group".to_string()));
                }
            }
            _ => {
                if group.is_empty() || name.is_empty() {
                    return Err(invalid("group and name must be non-empty".to_string()));
                }
            }
        }
        if name.is_empty() {
            return Err(invalid("name must be non-empty".to_string()));
        }
        Ok(())
    }

    pub fn env(&self) -> EnvKind {
        self.env
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DbName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.env, self.group, self.name)
    }
}

impl FromStr for DbName {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_names() {
        let db = DbName::parse("TEST;MyGroup;MyDb").unwrap();
        assert_eq!(db.env(), EnvKind::Test);
        assert_eq!(db.group(), "MyGroup");
        assert_eq!(db.name(), "MyDb");
        assert_eq!(db.to_string(), "TEST;MyGroup;MyDb");
    }

    #[test]
    fn custom_requires_empty_group() {
        let db = DbName::parse("CUSTOM;;legacy_db").unwrap();
        assert_eq!(db.env(), EnvKind::Custom);
        assert!(DbName::parse("CUSTOM;grp;legacy_db").is_err());
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(DbName::parse("TEST;MyGroup").is_err());
        assert!(DbName::parse("TEST;MyGroup;My;Db").is_err());
        assert!(DbName::parse("NOPE;MyGroup;MyDb").is_err());
        assert!(DbName::parse("TEST;MyGroup;My Db").is_err());
        assert!(DbName::parse("TEST;MyGroup;My.Db").is_err());
        assert!(DbName::parse("TEST;;MyDb").is_err());
        let long = format!("TEST;G;{}", "x".repeat(70));
        assert!(DbName::parse(&long).is_err());
    }

    #[test]
    fn drop_gating_follows_environment() {
        for (env, allowed) in [
            (EnvKind::Prod, false),
            (EnvKind::Uat, false),
            (EnvKind::Dev, true),
            (EnvKind::User, true),
            (EnvKind::Test, true),
            (EnvKind::Custom, false),
        ] {
            assert_eq!(env.allows_drop(), allowed, "{env}");
        }
    }
}
