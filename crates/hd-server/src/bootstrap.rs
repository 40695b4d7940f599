//! First-run seeding
//!
//! On an empty users table, create the system Administrator role and an
//! initial `admin` account so the instance is reachable at all. Runs once at
//! startup; a populated table makes this a no-op.

use hd_auth::PasswordHasher;
use hd_db::{CreateRoleDto, CreateUserDto, Database, RoleRepository, UserRepository};

const ADMIN_ROLE_NAME: &str = "Administrator";
const ADMIN_LOGIN: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

pub async fn seed_admin(db: &Database, hasher: &dyn PasswordHasher) -> anyhow::Result<()> {
    let users = UserRepository::new(db.pool().clone());
    let roles = RoleRepository::new(db.pool().clone());

    if users.count().await? > 0 {
        return Ok(());
    }

    let role = match roles.find_by_name(ADMIN_ROLE_NAME).await? {
        Some(role) => role,
        None => {
            roles
                .create(CreateRoleDto {
                    name: ADMIN_ROLE_NAME.to_string(),
                    admin: true,
                    system: true,
                    permissions: Vec::new(),
                })
                .await?
        }
    };

    let password = match std::env::var("HELPDESK_ADMIN_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => {
            tracing::warn!(
                "HELPDESK_ADMIN_PASSWORD not set, seeding admin with the default password; \
                 change it immediately"
            );
            DEFAULT_ADMIN_PASSWORD.to_string()
        }
    };

    let hashed = hasher
        .hash(&password)
        .map_err(|e| anyhow::anyhow!("failed to hash bootstrap password: {e}"))?;

    let admin = users
        .create(CreateUserDto {
            login: ADMIN_LOGIN.to_string(),
            mail: "admin@localhost".to_string(),
            hashed_password: Some(hashed),
            role_id: role.id,
            active: true,
        })
        .await?;

    tracing::info!(user_id = admin.id, role_id = role.id, "seeded initial administrator");
    Ok(())
}
