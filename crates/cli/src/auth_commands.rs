use {
    anyhow::Result,
    clap::Subcommand,
    xurl_oauth::Authenticator,
    xurl_store::{CredentialStore, OAuth1Token},
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Configure app-only authentication with a bearer token.
    App {
        #[arg(long)]
        bearer_token: String,
    },
    /// Authorize a user through the OAuth2 browser flow.
    Oauth2,
    /// Store OAuth1 user credentials.
    Oauth1 {
        #[arg(long)]
        consumer_key: String,
        #[arg(long)]
        consumer_secret: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        token_secret: String,
    },
    /// Show the credentials held by every app.
    Status,
    /// Remove stored credentials.
    Clear {
        /// Clear every credential of the app.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        oauth1: bool,
        /// Clear the OAuth2 token of this user.
        #[arg(long)]
        oauth2_username: Option<String>,
        #[arg(long)]
        bearer: bool,
    },
    /// Manage registered X API apps.
    Apps {
        #[command(subcommand)]
        action: AppsAction,
    },
    /// Set the default app and optionally its default OAuth2 user.
    Default { app: String, user: Option<String> },
}

#[derive(Subcommand)]
pub enum AppsAction {
    /// Register a new app.
    Add {
        name: String,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        client_secret: String,
    },
    /// Replace the client id and/or secret of an app.
    Update {
        name: String,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Remove an app and all its tokens.
    Remove { name: String },
    /// List registered apps.
    List,
}

pub async fn handle_auth(action: AuthAction, mut auth: Authenticator) -> Result<()> {
    let app = auth.app().map(str::to_string);
    let app = app.as_deref();

    match action {
        AuthAction::App { bearer_token } => {
            auth.store_mut().save_bearer_token(app, &bearer_token)?;
            println!("App authentication successful!");
        },
        AuthAction::Oauth2 => {
            auth.authorize(None).await?;
            println!("OAuth2 authentication successful!");
        },
        AuthAction::Oauth1 {
            consumer_key,
            consumer_secret,
            access_token,
            token_secret,
        } => {
            auth.store_mut().save_oauth1_token(app, OAuth1Token {
                access_token,
                token_secret,
                consumer_key,
                consumer_secret,
            })?;
            println!("OAuth1 credentials saved successfully!");
        },
        AuthAction::Status => {
            let lines = status_lines(auth.store());
            if lines.is_empty() {
                println!("No apps registered. Use 'xurl auth apps add' to register one.");
            }
            for line in lines {
                println!("{line}");
            }
        },
        AuthAction::Clear {
            all,
            oauth1,
            oauth2_username,
            bearer,
        } => clear(auth.store_mut(), app, all, oauth1, oauth2_username, bearer)?,
        AuthAction::Apps { action } => handle_apps(action, auth.store_mut())?,
        AuthAction::Default { app, user } => {
            let store = auth.store_mut();
            store.set_default_app(&app)?;
            println!("Default app set to {app:?}");
            if let Some(user) = user {
                store.set_default_user(Some(&app), &user)?;
                println!("Default user set to {user:?}");
            }
        },
    }
    Ok(())
}

fn clear(
    store: &mut CredentialStore,
    app: Option<&str>,
    all: bool,
    oauth1: bool,
    oauth2_username: Option<String>,
    bearer: bool,
) -> Result<()> {
    if all {
        store.clear_all(app)?;
        println!("All authentication cleared!");
    } else if oauth1 {
        store.clear_oauth1_token(app)?;
        println!("OAuth1 tokens cleared!");
    } else if let Some(user) = oauth2_username.filter(|u| !u.is_empty()) {
        store.clear_oauth2_token(app, &user)?;
        println!("OAuth2 token cleared for {user}!");
    } else if bearer {
        store.clear_bearer_token(app)?;
        println!("Bearer token cleared!");
    } else {
        anyhow::bail!("No authentication cleared! Use --all to clear all authentication.");
    }
    Ok(())
}

fn handle_apps(action: AppsAction, store: &mut CredentialStore) -> Result<()> {
    match action {
        AppsAction::Add {
            name,
            client_id,
            client_secret,
        } => {
            store.add_app(&name, &client_id, &client_secret)?;
            println!("App {name:?} registered!");
            if store.list_apps().len() == 1 {
                println!("  (set as default app)");
            }
        },
        AppsAction::Update {
            name,
            client_id,
            client_secret,
        } => {
            if client_id.is_none() && client_secret.is_none() {
                anyhow::bail!("Nothing to update. Provide --client-id and/or --client-secret.");
            }
            store.update_app(&name, client_id.as_deref(), client_secret.as_deref())?;
            println!("App {name:?} updated.");
        },
        AppsAction::Remove { name } => {
            store.remove_app(&name)?;
            println!("App {name:?} removed.");
        },
        AppsAction::List => {
            let apps = store.list_apps();
            if apps.is_empty() {
                println!("No apps registered. Use 'xurl auth apps add' to register one.");
            }
            for name in apps {
                let marker = if store.default_app() == Some(name.as_str()) {
                    "▸ "
                } else {
                    "  "
                };
                let hint = store
                    .app(&name)
                    .filter(|a| !a.client_id.is_empty())
                    .map(|a| format!(" (client_id: {}…)", client_id_hint(&a.client_id)))
                    .unwrap_or_default();
                println!("{marker}{name}{hint}");
            }
        },
    }
    Ok(())
}

fn client_id_hint(client_id: &str) -> String {
    client_id.chars().take(8).collect()
}

/// Per-app credential overview. The default app and default users are
/// marked with `▸`.
fn status_lines(store: &CredentialStore) -> Vec<String> {
    let mut lines = Vec::new();
    let apps = store.list_apps();
    for (i, name) in apps.iter().enumerate() {
        let Some(app) = store.app(name) else {
            continue;
        };
        let marker = if store.default_app() == Some(name.as_str()) {
            "▸"
        } else {
            " "
        };
        let hint = if app.client_id.is_empty() {
            "(no credentials)".to_string()
        } else {
            format!("client_id: {}…", client_id_hint(&app.client_id))
        };
        lines.push(format!("{marker} {name}  [{hint}]"));

        let users = store.oauth2_usernames(Some(name));
        if users.is_empty() {
            lines.push("      oauth2: (none)".into());
        }
        for user in users {
            if app.default_user.as_deref() == Some(user.as_str()) {
                lines.push(format!("    ▸ oauth2: {user}"));
            } else {
                lines.push(format!("      oauth2: {user}"));
            }
        }

        let check = |present: bool| if present { "✓" } else { "–" };
        lines.push(format!("      oauth1: {}", check(app.oauth1_token.is_some())));
        lines.push(format!("      bearer: {}", check(app.bearer_token.is_some())));

        if i + 1 < apps.len() {
            lines.push(String::new());
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_marks_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::load(dir.path().join(".xurl")).unwrap();
        store.add_app("alpha", "abcdefghijkl", "s").unwrap();
        store.add_app("beta", "", "").unwrap();
        store
            .save_oauth2_token(Some("alpha"), "alice", "a", "r", 0)
            .unwrap();
        store
            .save_oauth2_token(Some("alpha"), "bob", "b", "r", 0)
            .unwrap();
        store.set_default_user(Some("alpha"), "bob").unwrap();
        store.save_bearer_token(Some("beta"), "B").unwrap();

        assert_eq!(status_lines(&store), [
            "▸ alpha  [client_id: abcdefgh…]",
            "      oauth2: alice",
            "    ▸ oauth2: bob",
            "      oauth1: –",
            "      bearer: –",
            "",
            "  beta  [(no credentials)]",
            "      oauth2: (none)",
            "      oauth1: –",
            "      bearer: ✓",
        ]);
    }

    #[test]
    fn empty_store_has_no_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join(".xurl")).unwrap();
        assert!(status_lines(&store).is_empty());
    }

    #[test]
    fn clear_requires_a_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::load(dir.path().join(".xurl")).unwrap();
        store.save_bearer_token(None, "B").unwrap();

        assert!(clear(&mut store, None, false, false, None, false).is_err());
        assert!(store.has_bearer_token(None));

        clear(&mut store, None, false, false, None, true).unwrap();
        assert!(!store.has_bearer_token(None));
    }
}
