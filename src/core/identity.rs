use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error(
        "organization mismatch: '{embedded}' (from identity) != '{flag}' (from --org); use only one, or make them match"
    )]
    IdentityMismatch { flag: String, embedded: String },
    #[error(
        "malformed identity '{token}': {reason}; expected <user>@<alias> or <org>:<user>@<alias>"
    )]
    IdentityMalformed { token: String, reason: String },
}

/// Who we are syncing for and which SSH host alias carries the
/// credentials. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    org: Option<String>,
    user: String,
    ssh_alias: String,
}

impl Identity {
    /// Resolve the positional identity token together with an optional
    /// `--org` value. Both org sources must agree byte for byte.
    pub fn resolve(token: &str, org_flag: Option<&str>) -> Result<Self, IdentityError> {
        let parsed = parse_token(token)?;

        if let Some(flag) = org_flag {
            if flag.is_empty() || flag.chars().any(char::is_whitespace) {
                return Err(IdentityError::IdentityMalformed {
                    token: flag.to_string(),
                    reason: "--org must be a non-empty name without whitespace".to_string(),
                });
            }
        }

        let org = match (org_flag, parsed.org) {
            (Some(flag), Some(embedded)) if flag != embedded => {
                return Err(IdentityError::IdentityMismatch {
                    flag: flag.to_string(),
                    embedded,
                });
            }
            (Some(flag), _) => Some(flag.to_string()),
            (None, embedded) => embedded,
        };

        Ok(Self {
            org,
            user: parsed.user,
            ssh_alias: parsed.alias,
        })
    }

    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn ssh_alias(&self) -> &str {
        &self.ssh_alias
    }

    /// The account whose repositories are listed.
    pub fn owner(&self) -> &str {
        self.org.as_deref().unwrap_or(&self.user)
    }

    pub fn remote_url(&self, repo_name: &str) -> String {
        format!("git@{}:{}/{}.git", self.ssh_alias, self.owner(), repo_name)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.org {
            Some(org) => write!(f, "{}:{}@{}", org, self.user, self.ssh_alias),
            None => write!(f, "{}@{}", self.user, self.ssh_alias),
        }
    }
}

struct ParsedToken {
    org: Option<String>,
    user: String,
    alias: String,
}

fn parse_token(token: &str) -> Result<ParsedToken, IdentityError> {
    let malformed = |reason: &str| IdentityError::IdentityMalformed {
        token: token.to_string(),
        reason: reason.to_string(),
    };

    if token.is_empty() {
        return Err(malformed("identity is empty"));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(malformed("identity contains whitespace"));
    }

    let (head, alias) = token
        .rsplit_once('@')
        .ok_or_else(|| malformed("missing '@<alias>'"))?;
    if head.contains('@') {
        return Err(malformed("more than one '@'"));
    }
    if alias.is_empty() {
        return Err(malformed("ssh alias is empty"));
    }
    if alias.contains(':') || alias.contains('/') {
        return Err(malformed("ssh alias may not contain ':' or '/'"));
    }

    let (org, user) = match head.split_once(':') {
        Some((org, user)) => {
            if org.is_empty() {
                return Err(malformed("organization before ':' is empty"));
            }
            if user.contains(':') {
                return Err(malformed("more than one ':'"));
            }
            (Some(org.to_string()), user)
        }
        None => (None, head),
    };
    if user.is_empty() {
        return Err(malformed("user is empty"));
    }

    Ok(ParsedToken {
        org,
        user: user.to_string(),
        alias: alias.to_string(),
    })
}
