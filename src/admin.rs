//! Domain, user, feedback and stats administration.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::errors::ApiError;
use crate::core::security::{hash_password, Principal, Role, MIN_PASSWORD_LEN};
use crate::core::tenancy::{require_role, TenantScope};
use crate::documents::DocumentService;
use crate::relational::{Domain, Feedback, NewUser, RelationalStore, User};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub content: String,
    pub rating: i64,
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub domains: i64,
    pub admins: i64,
    pub docs: i64,
    pub system_health: &'static str,
}

#[derive(Clone)]
pub struct AdminService {
    relational: RelationalStore,
    documents: DocumentService,
}

impl AdminService {
    pub fn new(relational: RelationalStore, documents: DocumentService) -> Self {
        Self {
            relational,
            documents,
        }
    }

    pub async fn create_domain(
        &self,
        principal: &Principal,
        name: &str,
    ) -> Result<Domain, ApiError> {
        require_role(principal, &[Role::SuperAdmin])?;
        let domain = self.relational.create_domain(name).await?;
        info!("Domain {} ('{}') created", domain.id, domain.name);
        Ok(domain)
    }

    pub async fn list_domains(&self, principal: &Principal) -> Result<Vec<Domain>, ApiError> {
        require_role(principal, &[Role::SuperAdmin])?;
        self.relational.list_domains().await
    }

    pub async fn set_domain_active(
        &self,
        principal: &Principal,
        domain_id: i64,
        active: bool,
    ) -> Result<Domain, ApiError> {
        require_role(principal, &[Role::SuperAdmin])?;
        if !self.relational.set_domain_active(domain_id, active).await? {
            return Err(ApiError::NotFound("Domain not found".to_string()));
        }
        self.relational
            .get_domain(domain_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Domain not found".to_string()))
    }

    pub async fn delete_domain(
        &self,
        principal: &Principal,
        domain_id: i64,
    ) -> Result<u64, ApiError> {
        self.documents.delete_domain(principal, domain_id).await
    }

    /// Super admin creates the admin account of a domain.
    pub async fn create_admin(
        &self,
        principal: &Principal,
        domain_id: i64,
        account: CreateAccount,
    ) -> Result<User, ApiError> {
        require_role(principal, &[Role::SuperAdmin])?;
        validate_account(&account)?;
        if self.relational.get_domain(domain_id).await?.is_none() {
            return Err(ApiError::Validation("Invalid domain_id".to_string()));
        }
        self.create_account(account, Role::Admin, domain_id).await
    }

    /// Domain admin creates a plain user in their own domain.
    pub async fn create_user(
        &self,
        principal: &Principal,
        account: CreateAccount,
    ) -> Result<User, ApiError> {
        require_role(principal, &[Role::Admin])?;
        validate_account(&account)?;
        let domain_id = principal
            .domain_id
            .ok_or_else(|| ApiError::Access("Admin is not assigned to a domain".to_string()))?;
        self.create_account(account, Role::User, domain_id).await
    }

    async fn create_account(
        &self,
        account: CreateAccount,
        role: Role,
        domain_id: i64,
    ) -> Result<User, ApiError> {
        let password_hash = hash_password(&account.password)?;
        let user = self
            .relational
            .create_user(NewUser {
                username: account.username,
                email: account.email,
                password_hash,
                role,
                domain_id: Some(domain_id),
            })
            .await?;
        info!(
            "Created {} '{}' in domain {}",
            user.role, user.username, domain_id
        );
        Ok(user)
    }

    pub async fn list_users(&self, principal: &Principal) -> Result<Vec<User>, ApiError> {
        require_role(principal, &[Role::Admin, Role::SuperAdmin])?;
        let scope = TenantScope::for_principal(principal)?;
        self.relational.list_users(scope).await
    }

    pub async fn update_user_role(
        &self,
        principal: &Principal,
        user_id: i64,
        role: Role,
    ) -> Result<User, ApiError> {
        require_role(principal, &[Role::Admin, Role::SuperAdmin])?;
        if role == Role::SuperAdmin {
            return Err(ApiError::Validation("Invalid role".to_string()));
        }
        let scope = TenantScope::for_principal(principal)?;
        if !self.relational.update_user_role(user_id, role, scope).await? {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        self.scoped_user(user_id, scope).await
    }

    pub async fn update_user_email(
        &self,
        principal: &Principal,
        user_id: i64,
        email: &str,
    ) -> Result<User, ApiError> {
        require_role(principal, &[Role::Admin, Role::SuperAdmin])?;
        validate_email(email)?;
        let scope = TenantScope::for_principal(principal)?;
        if !self.relational.update_user_email(user_id, email, scope).await? {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        self.scoped_user(user_id, scope).await
    }

    pub async fn delete_user(&self, principal: &Principal, user_id: i64) -> Result<u64, ApiError> {
        self.documents.delete_user(principal, user_id).await
    }

    async fn scoped_user(&self, user_id: i64, scope: TenantScope) -> Result<User, ApiError> {
        self.relational
            .get_user(user_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn stats(&self, principal: &Principal) -> Result<SystemStats, ApiError> {
        require_role(principal, &[Role::SuperAdmin])?;
        Ok(SystemStats {
            domains: self.relational.count_domains().await?,
            admins: self.relational.count_users_with_role(Role::Admin).await?,
            docs: self.relational.count_documents(TenantScope::Global).await?,
            system_health: "ok",
        })
    }

    pub async fn post_feedback(
        &self,
        principal: &Principal,
        feedback: NewFeedback,
    ) -> Result<i64, ApiError> {
        require_role(principal, &[Role::User])?;
        if !(1..=5).contains(&feedback.rating) {
            return Err(ApiError::Validation("rating must be between 1 and 5".to_string()));
        }
        let content = feedback.content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Feedback content is required".to_string()));
        }
        let (Some(user_id), Some(domain_id)) = (principal.user_id, principal.domain_id) else {
            return Err(ApiError::Access(
                "Feedback requires a user assigned to a domain".to_string(),
            ));
        };
        let id = self
            .relational
            .create_feedback(user_id, domain_id, content, feedback.rating, feedback.question.trim())
            .await?;
        info!("Feedback {} recorded for domain {}", id, domain_id);
        Ok(id)
    }

    /// Users see their own feedback; admins see everything in scope.
    pub async fn list_feedback(&self, principal: &Principal) -> Result<Vec<Feedback>, ApiError> {
        match principal.role {
            Role::User => {
                let user_id = principal
                    .user_id
                    .ok_or_else(|| ApiError::Validation("user_id is required".to_string()))?;
                self.relational.list_feedback_for_user(user_id).await
            }
            Role::Admin | Role::SuperAdmin => {
                let scope = TenantScope::for_principal(principal)?;
                self.relational.list_feedback(scope).await
            }
        }
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::Validation(format!("Invalid email '{}'", email))),
    }
}

fn validate_account(account: &CreateAccount) -> Result<(), ApiError> {
    if account.username.trim().is_empty() {
        return Err(ApiError::Validation("Username is required".to_string()));
    }
    validate_email(&account.email)?;
    if account.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tenancy::fixtures;
    use crate::relational::test_support::{seeded, Seeded};
    use crate::vector::testing::ScriptedIndex;

    fn service(seed: &Seeded) -> AdminService {
        let documents = DocumentService::new(seed.store.clone(), ScriptedIndex::new());
        AdminService::new(seed.store.clone(), documents)
    }

    fn account(name: &str) -> CreateAccount {
        CreateAccount {
            username: name.to_string(),
            email: format!("{}@corp.example", name),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn super_admin_manages_domains_and_admins() {
        let seed = seeded().await;
        let admin_service = service(&seed);
        let root = fixtures::super_admin(None);

        let domain = admin_service.create_domain(&root, "gamma").await.unwrap();
        assert!(matches!(
            admin_service.create_domain(&root, "gamma").await,
            Err(ApiError::Conflict(_))
        ));
        let inactive = admin_service
            .set_domain_active(&root, domain.id, false)
            .await
            .unwrap();
        assert!(!inactive.active);

        let admin = admin_service
            .create_admin(&root, domain.id, account("gamma-admin"))
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.domain_id, Some(domain.id));
        assert!(admin.password_hash.starts_with("$argon2"));
        assert!(matches!(
            admin_service.create_admin(&root, 999, account("ghost")).await,
            Err(ApiError::Validation(_))
        ));

        let stats = admin_service.stats(&root).await.unwrap();
        assert_eq!(stats.domains, 3);
        assert_eq!(stats.admins, 2);

        let domain_admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        assert!(matches!(
            admin_service.list_domains(&domain_admin).await,
            Err(ApiError::Access(_))
        ));
    }

    #[tokio::test]
    async fn admins_manage_users_in_their_own_domain() {
        let seed = seeded().await;
        let admin_service = service(&seed);
        let admin = fixtures::admin(seed.admin_a.id, seed.domain_a.id);

        let created = admin_service
            .create_user(&admin, account("new-hire"))
            .await
            .unwrap();
        assert_eq!(created.role, Role::User);
        assert_eq!(created.domain_id, Some(seed.domain_a.id));

        let mut weak = account("weak");
        weak.password = "short".to_string();
        assert!(matches!(
            admin_service.create_user(&admin, weak).await,
            Err(ApiError::Validation(_))
        ));

        let users = admin_service.list_users(&admin).await.unwrap();
        assert!(users.iter().all(|u| u.domain_id == Some(seed.domain_a.id)));

        let promoted = admin_service
            .update_user_role(&admin, created.id, Role::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert!(matches!(
            admin_service
                .update_user_role(&admin, created.id, Role::SuperAdmin)
                .await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            admin_service
                .update_user_email(&admin, seed.user_b.id, "b@corp.example")
                .await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            admin_service
                .update_user_email(&admin, created.id, "user-a@example.test")
                .await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn feedback_is_posted_by_users_and_read_in_scope() {
        let seed = seeded().await;
        let admin_service = service(&seed);
        let user = fixtures::user(seed.user_a.id, seed.domain_a.id);

        let id = admin_service
            .post_feedback(
                &user,
                NewFeedback {
                    content: "Helpful answer".to_string(),
                    rating: 5,
                    question: "Vacation?".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(id > 0);
        assert!(matches!(
            admin_service
                .post_feedback(
                    &user,
                    NewFeedback {
                        content: "x".to_string(),
                        rating: 6,
                        question: String::new(),
                    },
                )
                .await,
            Err(ApiError::Validation(_))
        ));

        assert_eq!(admin_service.list_feedback(&user).await.unwrap().len(), 1);
        let admin_a = fixtures::admin(seed.admin_a.id, seed.domain_a.id);
        assert_eq!(admin_service.list_feedback(&admin_a).await.unwrap().len(), 1);
        let outsider = fixtures::user(seed.user_b.id, seed.domain_b.id);
        assert!(admin_service.list_feedback(&outsider).await.unwrap().is_empty());
    }
}
