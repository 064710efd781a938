use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use expensa_core::currency::CurrencyCode;
use expensa_core::domain::approval::{ApprovalRule, NewApprovalRule};
use expensa_core::domain::company::{Company, NewCompany};
use expensa_core::domain::user::{NewUser, Role, User, UserId};
use expensa_core::errors::{ApplicationError, DomainError};

use super::Stores;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistration {
    pub company_name: String,
    pub default_currency: String,
    pub admin_name: String,
    pub admin_email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRuleDraft {
    pub name: String,
    pub min_amount: Decimal,
    /// Approvers in sequence order.
    pub approver_ids: Vec<UserId>,
}

/// Tenant setup: companies, their users, and their approval rules.
#[derive(Clone)]
pub struct AdminService {
    stores: Stores,
}

impl AdminService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Creates a company together with its first admin.
    pub async fn register_company(
        &self,
        registration: CompanyRegistration,
    ) -> Result<(Company, User), ApplicationError> {
        let company_name = required("company_name", &registration.company_name)?;
        let default_currency = CurrencyCode::parse(&registration.default_currency)?;
        let admin_name = required("admin_name", &registration.admin_name)?;
        let admin_email = self.available_email(&registration.admin_email).await?;

        let company = self
            .stores
            .companies
            .create(NewCompany { name: company_name, default_currency })
            .await?;
        let admin = self
            .stores
            .users
            .create(NewUser {
                company_id: company.id,
                name: admin_name,
                email: admin_email,
                role: Role::Admin,
                manager_id: None,
            })
            .await?;

        info!(
            event_name = "admin.company.registered",
            company_id = %company.id,
            admin_id = %admin.id,
            currency = %company.default_currency,
            "company registered"
        );

        Ok((company, admin))
    }

    pub async fn create_user(
        &self,
        actor_id: UserId,
        draft: UserDraft,
    ) -> Result<User, ApplicationError> {
        let actor = self.require_admin(actor_id).await?;
        let name = required("name", &draft.name)?;
        let email = self.available_email(&draft.email).await?;

        if let Some(manager_id) = draft.manager_id {
            let manager = self.stores.users.find_by_id(manager_id).await?;
            match manager {
                Some(manager) if manager.company_id == actor.company_id => {
                    if !manager.role.can_approve() {
                        return Err(DomainError::Validation(format!(
                            "manager {manager_id} has role `{}` and cannot approve expenses",
                            manager.role
                        ))
                        .into());
                    }
                }
                _ => {
                    return Err(DomainError::Validation(format!(
                        "manager {manager_id} does not exist in this company"
                    ))
                    .into())
                }
            }
        }

        let user = self
            .stores
            .users
            .create(NewUser {
                company_id: actor.company_id,
                name,
                email,
                role: draft.role,
                manager_id: draft.manager_id,
            })
            .await?;

        info!(
            event_name = "admin.user.created",
            actor_id = %actor.id,
            user_id = %user.id,
            role = %user.role,
            "user created"
        );

        Ok(user)
    }

    pub async fn list_users(&self, actor_id: UserId) -> Result<Vec<User>, ApplicationError> {
        let actor = self.require_admin(actor_id).await?;
        Ok(self.stores.users.list_by_company(actor.company_id).await?)
    }

    pub async fn create_approval_rule(
        &self,
        actor_id: UserId,
        draft: ApprovalRuleDraft,
    ) -> Result<ApprovalRule, ApplicationError> {
        let actor = self.require_admin(actor_id).await?;
        let name = required("name", &draft.name)?;

        if draft.min_amount < Decimal::ZERO {
            return Err(
                DomainError::Validation("min_amount must not be negative".to_string()).into()
            );
        }
        if draft.approver_ids.is_empty() {
            return Err(
                DomainError::Validation("at least one approver is required".to_string()).into()
            );
        }

        let mut seen = BTreeSet::new();
        for approver_id in &draft.approver_ids {
            if !seen.insert(*approver_id) {
                return Err(DomainError::Validation(format!(
                    "approver {approver_id} appears more than once"
                ))
                .into());
            }

            let approver = self.stores.users.find_by_id(*approver_id).await?;
            match approver {
                Some(approver) if approver.company_id != actor.company_id => {
                    return Err(DomainError::Validation(format!(
                        "approver {approver_id} does not exist in this company"
                    ))
                    .into())
                }
                Some(approver) if !approver.role.can_approve() => {
                    return Err(DomainError::Validation(format!(
                        "approver {approver_id} has role `{}` and cannot approve",
                        approver.role
                    ))
                    .into())
                }
                Some(_) => {}
                None => {
                    return Err(DomainError::Validation(format!(
                        "approver {approver_id} does not exist in this company"
                    ))
                    .into())
                }
            }
        }

        let rule = self
            .stores
            .rules
            .create(NewApprovalRule {
                company_id: actor.company_id,
                name,
                min_amount: draft.min_amount,
                approver_ids: draft.approver_ids,
            })
            .await?;

        info!(
            event_name = "admin.approval_rule.created",
            actor_id = %actor.id,
            rule_id = %rule.id,
            min_amount = %rule.min_amount,
            steps = rule.steps.len(),
            "approval rule created"
        );

        Ok(rule)
    }

    pub async fn list_approval_rules(
        &self,
        actor_id: UserId,
    ) -> Result<Vec<ApprovalRule>, ApplicationError> {
        let actor = self.require_admin(actor_id).await?;
        let mut rules = self.stores.rules.list_by_company(actor.company_id).await?;
        for rule in &mut rules {
            rule.steps.sort_by_key(|step| step.step);
        }
        Ok(rules)
    }

    async fn require_admin(&self, actor_id: UserId) -> Result<User, ApplicationError> {
        let actor = self.stores.require_user(actor_id).await?;
        if !actor.role.can_administer() {
            return Err(
                DomainError::forbidden(actor.id, "only admins may manage the company").into()
            );
        }
        Ok(actor)
    }

    async fn available_email(&self, raw: &str) -> Result<String, ApplicationError> {
        let email = required("email", raw)?;
        if !email.contains('@') {
            return Err(
                DomainError::Validation(format!("`{email}` is not an email address")).into()
            );
        }
        if self.stores.users.find_by_email(&email).await?.is_some() {
            return Err(
                DomainError::Conflict(format!("email `{email}` is already registered")).into()
            );
        }
        Ok(email)
    }
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use expensa_core::domain::user::{Role, User, UserId};
    use expensa_core::errors::{ApplicationError, DomainError};

    use super::{AdminService, ApprovalRuleDraft, CompanyRegistration, UserDraft};
    use crate::services::Stores;

    async fn registered() -> (AdminService, User) {
        let admin = AdminService::new(Stores::in_memory());
        let (_, owner) = admin
            .register_company(CompanyRegistration {
                company_name: "Acme".to_string(),
                default_currency: "inr".to_string(),
                admin_name: "Ada".to_string(),
                admin_email: "ada@acme.test".to_string(),
            })
            .await
            .expect("register");
        (admin, owner)
    }

    fn draft(name: &str, role: Role, manager_id: Option<UserId>) -> UserDraft {
        UserDraft {
            name: name.to_string(),
            email: format!("{}@acme.test", name.to_ascii_lowercase()),
            role,
            manager_id,
        }
    }

    fn domain(error: ApplicationError) -> DomainError {
        match error {
            ApplicationError::Domain(error) => error,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registration_creates_company_and_admin() {
        let admin = AdminService::new(Stores::in_memory());
        let (company, owner) = admin
            .register_company(CompanyRegistration {
                company_name: " Acme ".to_string(),
                default_currency: "eur".to_string(),
                admin_name: "Ada".to_string(),
                admin_email: "ada@acme.test".to_string(),
            })
            .await
            .expect("register");

        assert_eq!(company.name, "Acme");
        assert_eq!(company.default_currency.as_str(), "EUR");
        assert_eq!(owner.role, Role::Admin);
        assert_eq!(owner.company_id, company.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (admin, owner) = registered().await;
        admin.create_user(owner.id, draft("Mia", Role::Manager, None)).await.expect("first");

        let error = admin
            .create_user(owner.id, draft("Mia", Role::Employee, None))
            .await
            .expect_err("duplicate");
        assert!(matches!(domain(error), DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn only_admins_manage_users_and_rules() {
        let (admin, owner) = registered().await;
        let manager =
            admin.create_user(owner.id, draft("Mia", Role::Manager, None)).await.expect("manager");

        let error = admin
            .create_user(manager.id, draft("Eli", Role::Employee, Some(manager.id)))
            .await
            .expect_err("manager cannot create users");
        assert!(matches!(domain(error), DomainError::Forbidden { .. }));

        let error =
            admin.list_approval_rules(manager.id).await.expect_err("manager cannot list rules");
        assert!(matches!(domain(error), DomainError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn manager_must_belong_to_the_same_company() {
        let (admin, owner) = registered().await;
        let (_, other_owner) = admin
            .register_company(CompanyRegistration {
                company_name: "Globex".to_string(),
                default_currency: "USD".to_string(),
                admin_name: "Hank".to_string(),
                admin_email: "hank@globex.test".to_string(),
            })
            .await
            .expect("second company");

        let error = admin
            .create_user(owner.id, draft("Eli", Role::Employee, Some(other_owner.id)))
            .await
            .expect_err("foreign manager");
        assert!(matches!(domain(error), DomainError::Validation(_)));

        let users = admin.list_users(owner.id).await.expect("list");
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn manager_must_hold_an_approving_role() {
        let (admin, owner) = registered().await;
        let peer =
            admin.create_user(owner.id, draft("Pia", Role::Employee, None)).await.expect("peer");

        let error = admin
            .create_user(owner.id, draft("Eli", Role::Employee, Some(peer.id)))
            .await
            .expect_err("employee as manager");
        assert!(matches!(
            domain(error),
            DomainError::Validation(message) if message.contains("cannot approve")
        ));

        let users = admin.list_users(owner.id).await.expect("list");
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn rule_creation_validates_approvers() {
        let (admin, owner) = registered().await;
        let manager =
            admin.create_user(owner.id, draft("Mia", Role::Manager, None)).await.expect("manager");
        let employee = admin
            .create_user(owner.id, draft("Eli", Role::Employee, Some(manager.id)))
            .await
            .expect("employee");

        let duplicate = admin
            .create_approval_rule(
                owner.id,
                ApprovalRuleDraft {
                    name: "dup".to_string(),
                    min_amount: Decimal::ZERO,
                    approver_ids: vec![manager.id, manager.id],
                },
            )
            .await
            .expect_err("duplicate approver");
        assert!(matches!(
            domain(duplicate),
            DomainError::Validation(message) if message.contains("more than once")
        ));

        let employee_step = admin
            .create_approval_rule(
                owner.id,
                ApprovalRuleDraft {
                    name: "emp".to_string(),
                    min_amount: Decimal::ZERO,
                    approver_ids: vec![employee.id],
                },
            )
            .await
            .expect_err("employee approver");
        assert!(matches!(
            domain(employee_step),
            DomainError::Validation(message) if message.contains("cannot approve")
        ));

        let negative = admin
            .create_approval_rule(
                owner.id,
                ApprovalRuleDraft {
                    name: "neg".to_string(),
                    min_amount: Decimal::new(-1, 0),
                    approver_ids: vec![manager.id],
                },
            )
            .await
            .expect_err("negative threshold");
        assert!(matches!(domain(negative), DomainError::Validation(_)));

        let rule = admin
            .create_approval_rule(
                owner.id,
                ApprovalRuleDraft {
                    name: "Large".to_string(),
                    min_amount: Decimal::new(5000, 0),
                    approver_ids: vec![manager.id, owner.id],
                },
            )
            .await
            .expect("valid rule");
        assert_eq!(rule.steps.len(), 2);
        assert_eq!(rule.first_step().map(|step| step.approver_id), Some(manager.id));

        let listed = admin.list_approval_rules(owner.id).await.expect("list");
        assert_eq!(listed, vec![rule]);
    }
}
