use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    /// Roles that may hold the approver slot of an expense or appear in a rule step.
    pub fn can_approve(&self) -> bool {
        match self {
            Self::Admin | Self::Manager => true,
            Self::Employee => false,
        }
    }

    pub fn can_administer(&self) -> bool {
        match self {
            Self::Admin => true,
            Self::Manager | Self::Employee => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            other => Err(DomainError::Validation(format!(
                "unsupported role `{other}` (expected admin|manager|employee)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub company_id: CompanyId,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Immediate manager, looked up by id. Never traversed transitively.
    pub manager_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub company_id: CompanyId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Manager".parse::<Role>().expect("manager"), Role::Manager);
        assert_eq!(" ADMIN ".parse::<Role>().expect("admin"), Role::Admin);
        assert!("intern".parse::<Role>().is_err());
    }

    #[test]
    fn only_managers_and_admins_can_approve() {
        assert!(Role::Admin.can_approve());
        assert!(Role::Manager.can_approve());
        assert!(!Role::Employee.can_approve());
    }
}
