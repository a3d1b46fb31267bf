//! `config show|path|set-password`.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

use super::config_file;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let config = fusion_config::load_config(global.config.as_deref())?;
            print!("{}", fusion_config::render_config(&config)?);
        }

        ConfigCommand::Path => println!("{}", config_file(global).display()),

        ConfigCommand::SetPassword { ref username } => {
            let username = match username {
                Some(u) => u.clone(),
                None => {
                    let config = fusion_config::load_config(global.config.as_deref())?;
                    fusion_config::resolve_username(&config).ok_or(CliError::NoCredentials)?
                }
            };

            let password = rpassword::prompt_password(format!("Portal password for {username}: "))?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            fusion_config::store_password(&username, &password)?;
            eprintln!("   ✓ password for {username} stored in system keyring");
        }
    }
    Ok(())
}
