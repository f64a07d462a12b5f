use anyhow::{Context, Result, bail};
use std::io::{self, Write};
use tenny_client::ApiClient;
use tenny_core::{Credentials, Registration};
use tracing::info;

pub fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

fn prompt_secret(label: &str) -> Result<String> {
    // Plain stdin; the terminal will echo.
    prompt(label)
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    let v = match value {
        Some(v) => v.trim().to_string(),
        None => prompt(label)?,
    };
    if v.is_empty() {
        bail!("{} is required", label.to_lowercase());
    }
    Ok(v)
}

pub async fn login(client: &ApiClient, email: Option<String>) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;
    let password = prompt_secret("Password")?;
    if password.is_empty() {
        bail!("password is required");
    }

    let auth = client
        .login(&Credentials { email, password })
        .await
        .context("login failed")?;
    info!(user = %auth.user.id, "signed in");
    println!("Signed in as {} <{}>", auth.user.name, auth.user.email);
    Ok(())
}

pub async fn register(client: &ApiClient, email: Option<String>, name: Option<String>) -> Result<()> {
    let name = value_or_prompt(name, "Name")?;
    let email = value_or_prompt(email, "Email")?;
    let password = prompt_secret("Password")?;
    let confirm = prompt_secret("Confirm password")?;
    if password.is_empty() {
        bail!("password is required");
    }
    if password != confirm {
        bail!("passwords do not match");
    }

    let auth = client
        .register(&Registration { email, password, name })
        .await
        .context("registration failed")?;
    info!(user = %auth.user.id, "registered");
    println!("Welcome, {}! You are signed in.", auth.user.name);
    Ok(())
}

pub fn logout(client: &ApiClient) {
    client.logout();
    println!("Signed out");
}

/// y/N question; anything but an explicit yes is a no
pub fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N]"))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}
