use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use sitedesk_core::types::Role;
use sitedesk_core::user::{self, Registration};
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum UserSubcommand {
    /// Create an account (the first account is always an admin)
    Create {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SITEDESK_PASSWORD")]
        password: String,
        /// project_manager, supervisor, site_manager or admin
        #[arg(long, default_value = "project_manager")]
        role: Role,
        #[arg(long)]
        name: Option<String>,
        /// Sign in with the password alone, without a one-time code
        #[arg(long)]
        no_otp: bool,
    },
    /// List accounts
    List,
    /// Change an account's role
    Role { id: i64, role: Role },
}

pub fn run(root: &Path, subcommand: UserSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        UserSubcommand::Create {
            email,
            password,
            role,
            name,
            no_otp,
        } => create(root, email, password, role, name, no_otp, json),
        UserSubcommand::List => list(root, json),
        UserSubcommand::Role { id, role } => set_role(root, id, role, json),
    }
}

fn create(
    root: &Path,
    email: String,
    password: String,
    role: Role,
    name: Option<String>,
    no_otp: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (config, mut store) = super::open(root)?;
    let now = Utc::now();
    let tx = store.transaction()?;
    // The admin guard is for self-registration; the role is applied below.
    let reg = Registration {
        email,
        password,
        name,
        ..Default::default()
    };
    let registered = user::register(&tx, &reg, None, &config.auth, now)
        .context("failed to create user")?;
    let mut created = registered.user;
    if created.role != role && !created.is_admin() {
        created = user::set_role(&tx, created.id, role, now)?;
    }
    if no_otp {
        user::set_otp_required(&tx, created.id, false)?;
        created.otp_required = false;
    }
    tx.commit()?;
    tracing::info!(user_id = created.id, role = %created.role, "user created from the command line");

    if json {
        return print_json(&created);
    }
    println!("Created user {} ({}) as {}", created.id, created.email, created.role);
    if created.role != role {
        println!("The first account is always an admin.");
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = super::open(root)?;
    let users = user::list(store.conn())?;
    if json {
        return print_json(&users);
    }
    let rows = users
        .iter()
        .map(|u| {
            vec![
                u.id.to_string(),
                u.email.clone(),
                u.display_name().to_string(),
                u.role.to_string(),
                if u.confirmed_at.is_some() { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "EMAIL", "NAME", "ROLE", "CONFIRMED"], rows);
    Ok(())
}

fn set_role(root: &Path, id: i64, role: Role, json: bool) -> anyhow::Result<()> {
    let (_, store) = super::open(root)?;
    let updated = user::set_role(store.conn(), id, role, Utc::now())?;
    if json {
        return print_json(&updated);
    }
    println!("User {} is now {}", updated.id, updated.role);
    Ok(())
}
