use crate::acl::Role;
use crate::context::RequestContext;
use crate::settings::Admin;
use crate::users::{CreateUserInput, UserService};
use miette::{IntoDiagnostic, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum SeedResult {
    Created,
    Unchanged,
    Skipped,
}

/// Create the configured admin account unless it already exists (idempotent).
pub async fn ensure_default_admin(users: &UserService, admin: &Admin) -> Result<SeedResult> {
    let Some(password) = admin.password.as_deref() else {
        tracing::info!("No admin password configured, skipping admin seeding");
        return Ok(SeedResult::Skipped);
    };

    let ctx = RequestContext::internal();

    if users
        .find_by_username(&ctx, &admin.username)
        .await
        .into_diagnostic()?
        .is_some()
    {
        tracing::debug!(username = %admin.username, "Admin user already present");
        return Ok(SeedResult::Unchanged);
    }

    let user = users
        .create_user(
            &ctx,
            CreateUserInput {
                name: admin.name.clone(),
                username: admin.username.clone(),
                password: password.to_string(),
                email: admin.email.clone(),
                roles: vec![Role::Admin],
                is_account_disabled: false,
            },
        )
        .await
        .map_err(|e| miette::miette!("Failed to create admin user '{}': {}", admin.username, e))?;

    tracing::info!(user_id = user.id, username = %user.username, "Created default admin user");
    Ok(SeedResult::Created)
}
