use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    tracing::{debug, info, warn},
    xurl_common::{Result, StoreError},
};

use crate::{
    migrate::{self, LEGACY_APP_NAME, Loaded},
    types::{App, Credential, OAuth1Token, OAuth2Token, StoreDocument},
};

/// Ambient values applied while opening the store.
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Foreign credential file merged into the active app when it lacks
    /// OAuth1 or bearer credentials.
    pub twurlrc_path: Option<PathBuf>,
}

/// How an app name was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppOrigin {
    /// The explicitly requested app exists.
    Named,
    /// No usable name was given; the store default was used.
    Default,
    /// No default existed, so an empty `"default"` app was created.
    CreatedDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppResolution {
    pub name: String,
    pub origin: AppOrigin,
}

/// Multi-app credential store persisted as YAML.
///
/// Every mutation rewrites the whole file before returning. Concurrent
/// processes are not coordinated; the last writer wins.
#[derive(Debug)]
pub struct CredentialStore {
    doc: StoreDocument,
    path: PathBuf,
}

impl CredentialStore {
    /// Load the store, backfill ambient client credentials and import a
    /// twurlrc file when the active app is missing OAuth1 or bearer tokens.
    pub fn open(path: impl Into<PathBuf>, options: &StoreOptions) -> Result<Self> {
        let mut store = Self::load(path)?;
        store.backfill_client_credentials(
            options.client_id.as_deref(),
            options.client_secret.as_deref(),
        )?;

        if let Some(rc_path) = &options.twurlrc_path
            && rc_path.exists()
        {
            let incomplete = store
                .find_app(None)
                .is_none_or(|app| app.oauth1_token.is_none() || app.bearer_token.is_none());
            if incomplete && let Err(e) = store.import_twurlrc(rc_path) {
                warn!(path = %rc_path.display(), error = %e, "failed to import twurlrc");
            }
        }
        Ok(store)
    }

    /// Load the store, converting a legacy single-app file in place.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            doc: StoreDocument::default(),
            path: path.into(),
        };
        let raw = match fs::read_to_string(&store.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(store);
        }

        match migrate::parse_document(&raw)? {
            Loaded::Current(doc) => store.doc = doc,
            Loaded::Legacy(doc) => {
                store.doc = doc;
                info!(path = %store.path.display(), "migrated legacy credential file");
                store.save()?;
            },
        }
        Ok(store)
    }

    /// Rewrite the backing file with mode `0600`.
    pub fn save(&self) -> Result<()> {
        let data = serde_yaml::to_string(&self.doc)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), apps = self.doc.apps.len(), "credential store saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &StoreDocument {
        &self.doc
    }

    // ── Apps ────────────────────────────────────────────────────────────────

    /// Register an app. The first app registered becomes the default.
    pub fn add_app(&mut self, name: &str, client_id: &str, client_secret: &str) -> Result<()> {
        if self.doc.apps.contains_key(name) {
            return Err(StoreError::DuplicateApp(name.to_string()).into());
        }
        self.doc
            .apps
            .insert(name.to_string(), App::new(client_id, client_secret));
        if self.doc.apps.len() == 1 {
            self.doc.default_app = Some(name.to_string());
        }
        self.save()
    }

    /// Replace an app's client credentials. `None` or empty leaves a field
    /// unchanged.
    pub fn update_app(
        &mut self,
        name: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<()> {
        let app = self
            .doc
            .apps
            .get_mut(name)
            .ok_or_else(|| StoreError::AppNotFound(name.to_string()))?;
        if let Some(id) = client_id.filter(|s| !s.is_empty()) {
            app.client_id = id.to_string();
        }
        if let Some(secret) = client_secret.filter(|s| !s.is_empty()) {
            app.client_secret = secret.to_string();
        }
        self.save()
    }

    /// Remove an app with all its tokens. A removed default is reassigned to
    /// the first remaining app by name, or cleared.
    pub fn remove_app(&mut self, name: &str) -> Result<()> {
        if self.doc.apps.remove(name).is_none() {
            return Err(StoreError::AppNotFound(name.to_string()).into());
        }
        if self.doc.default_app.as_deref() == Some(name) {
            self.doc.default_app = self.doc.apps.keys().next().cloned();
        }
        self.save()
    }

    /// App names in sorted order.
    pub fn list_apps(&self) -> Vec<String> {
        self.doc.apps.keys().cloned().collect()
    }

    pub fn app(&self, name: &str) -> Option<&App> {
        self.doc.apps.get(name)
    }

    pub fn set_default_app(&mut self, name: &str) -> Result<()> {
        if !self.doc.apps.contains_key(name) {
            return Err(StoreError::AppNotFound(name.to_string()).into());
        }
        self.doc.default_app = Some(name.to_string());
        self.save()
    }

    pub fn default_app(&self) -> Option<&str> {
        self.doc.default_app.as_deref()
    }

    /// The explicit name when given, otherwise the default app's name.
    pub fn active_app_name<'a>(&'a self, explicit: Option<&'a str>) -> Option<&'a str> {
        explicit
            .filter(|name| !name.is_empty())
            .or(self.doc.default_app.as_deref())
    }

    /// Resolve an optional app name to a live app.
    ///
    /// Empty and unknown names fall back to the default app. When there is
    /// no default either, a `"default"` app is created in memory; it is
    /// persisted by the next save.
    pub fn resolve_app(&mut self, name: Option<&str>) -> AppResolution {
        if let Some(name) = name.filter(|n| !n.is_empty())
            && self.doc.apps.contains_key(name)
        {
            return AppResolution {
                name: name.to_string(),
                origin: AppOrigin::Named,
            };
        }
        if let Some(default) = &self.doc.default_app
            && self.doc.apps.contains_key(default)
        {
            return AppResolution {
                name: default.clone(),
                origin: AppOrigin::Default,
            };
        }

        let origin = if self.doc.apps.contains_key(LEGACY_APP_NAME) {
            AppOrigin::Default
        } else {
            self.doc
                .apps
                .insert(LEGACY_APP_NAME.to_string(), App::default());
            debug!("created empty default app");
            AppOrigin::CreatedDefault
        };
        self.doc.default_app = Some(LEGACY_APP_NAME.to_string());
        AppResolution {
            name: LEGACY_APP_NAME.to_string(),
            origin,
        }
    }

    /// Read-only counterpart of [`Self::resolve_app`]. `None` means the
    /// resolution would create a new, empty app.
    pub fn find_app(&self, name: Option<&str>) -> Option<&App> {
        name.filter(|n| !n.is_empty())
            .and_then(|n| self.doc.apps.get(n))
            .or_else(|| {
                self.doc
                    .default_app
                    .as_deref()
                    .and_then(|d| self.doc.apps.get(d))
            })
            .or_else(|| self.doc.apps.get(LEGACY_APP_NAME))
    }

    fn resolved_mut(&mut self, name: Option<&str>) -> &mut App {
        let resolved = self.resolve_app(name).name;
        self.doc.apps.entry(resolved).or_default()
    }

    // ── Users ───────────────────────────────────────────────────────────────

    /// Make `username` the app's default OAuth2 user. The user must already
    /// hold an OAuth2 token on that app.
    pub fn set_default_user(&mut self, app: Option<&str>, username: &str) -> Result<()> {
        let resolved = self.resolve_app(app).name;
        let entry = self.doc.apps.entry(resolved.clone()).or_default();
        if !entry.oauth2_tokens.contains_key(username) {
            return Err(StoreError::UserNotFound {
                app: resolved,
                user: username.to_string(),
            }
            .into());
        }
        entry.default_user = Some(username.to_string());
        self.save()
    }

    pub fn default_user(&self, app: Option<&str>) -> Option<&str> {
        self.find_app(app).and_then(|a| a.default_user.as_deref())
    }

    pub fn oauth2_usernames(&self, app: Option<&str>) -> Vec<String> {
        self.find_app(app)
            .map(|a| a.oauth2_tokens.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ── Tokens ──────────────────────────────────────────────────────────────

    pub fn save_bearer_token(&mut self, app: Option<&str>, token: &str) -> Result<()> {
        self.resolved_mut(app).bearer_token = Some(Credential::bearer(token));
        self.save()
    }

    pub fn save_oauth2_token(
        &mut self,
        app: Option<&str>,
        username: &str,
        access_token: &str,
        refresh_token: &str,
        expiration_time: u64,
    ) -> Result<()> {
        let token = OAuth2Token {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expiration_time,
        };
        self.resolved_mut(app)
            .oauth2_tokens
            .insert(username.to_string(), Credential::oauth2(token));
        debug!(username, expiration_time, "oauth2 token stored");
        self.save()
    }

    pub fn save_oauth1_token(&mut self, app: Option<&str>, token: OAuth1Token) -> Result<()> {
        self.resolved_mut(app).oauth1_token = Some(Credential::oauth1(token));
        self.save()
    }

    pub fn bearer_token(&self, app: Option<&str>) -> Option<&str> {
        self.find_app(app).and_then(App::bearer)
    }

    pub fn oauth2_token(&self, app: Option<&str>, username: &str) -> Option<&OAuth2Token> {
        self.find_app(app).and_then(|a| a.oauth2(username))
    }

    /// The default user's token, or the first stored one.
    pub fn first_oauth2_token(&self, app: Option<&str>) -> Option<(&str, &OAuth2Token)> {
        self.find_app(app).and_then(App::first_oauth2)
    }

    pub fn oauth1_token(&self, app: Option<&str>) -> Option<&OAuth1Token> {
        self.find_app(app).and_then(App::oauth1)
    }

    pub fn has_bearer_token(&self, app: Option<&str>) -> bool {
        self.bearer_token(app).is_some()
    }

    pub fn has_oauth1_token(&self, app: Option<&str>) -> bool {
        self.oauth1_token(app).is_some()
    }

    pub fn has_oauth2_token(&self, app: Option<&str>) -> bool {
        self.first_oauth2_token(app).is_some()
    }

    pub fn clear_bearer_token(&mut self, app: Option<&str>) -> Result<()> {
        self.resolved_mut(app).bearer_token = None;
        self.save()
    }

    pub fn clear_oauth1_token(&mut self, app: Option<&str>) -> Result<()> {
        self.resolved_mut(app).oauth1_token = None;
        self.save()
    }

    /// Remove one user's OAuth2 token; clears the default user pointer when
    /// it named that user.
    pub fn clear_oauth2_token(&mut self, app: Option<&str>, username: &str) -> Result<()> {
        let entry = self.resolved_mut(app);
        entry.oauth2_tokens.remove(username);
        if entry.default_user.as_deref() == Some(username) {
            entry.default_user = None;
        }
        self.save()
    }

    /// Remove every credential from an app, keeping its registration.
    pub fn clear_all(&mut self, app: Option<&str>) -> Result<()> {
        let entry = self.resolved_mut(app);
        entry.oauth2_tokens.clear();
        entry.oauth1_token = None;
        entry.bearer_token = None;
        entry.default_user = None;
        self.save()
    }

    // ── Migration ───────────────────────────────────────────────────────────

    /// Merge credentials from a twurlrc file into the active app, without
    /// replacing OAuth1 or bearer credentials it already has.
    ///
    /// The file is parsed before anything is touched, so a malformed file
    /// leaves both memory and disk unchanged. Returns whether anything was
    /// merged.
    pub fn import_twurlrc(&mut self, path: &Path) -> Result<bool> {
        let raw = fs::read_to_string(path)?;
        let foreign = migrate::parse_twurlrc(&raw)?;

        let entry = self.resolved_mut(None);
        let mut changed = false;
        if entry.oauth1_token.is_none()
            && let Some(token) = foreign.oauth1
        {
            entry.oauth1_token = Some(Credential::oauth1(token));
            changed = true;
        }
        if entry.bearer_token.is_none()
            && let Some(token) = foreign.bearer
        {
            entry.bearer_token = Some(Credential::bearer(token));
            changed = true;
        }

        if changed {
            info!(path = %path.display(), "imported credentials from twurlrc");
            self.save()?;
        }
        Ok(changed)
    }

    /// Fill in missing client credentials on apps that already hold tokens.
    /// Explicit values are never replaced. Returns whether anything changed.
    pub fn backfill_client_credentials(
        &mut self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<bool> {
        let client_id = client_id.filter(|s| !s.is_empty());
        let client_secret = client_secret.filter(|s| !s.is_empty());
        let mut changed = false;

        for (name, app) in self.doc.apps.iter_mut() {
            if !app.has_credentials() {
                continue;
            }
            let mut filled = false;
            if app.client_id.is_empty()
                && let Some(id) = client_id
            {
                app.client_id = id.to_string();
                filled = true;
            }
            if app.client_secret.is_empty()
                && let Some(secret) = client_secret
            {
                app.client_secret = secret.to_string();
                filled = true;
            }
            if filled {
                debug!(app = %name, "backfilled client credentials");
                changed = true;
            }
        }

        if changed {
            self.save()?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, xurl_common::Error};

    fn temp_store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join(".xurl")).unwrap();
        (dir, store)
    }

    fn oauth1() -> OAuth1Token {
        OAuth1Token {
            access_token: "t".into(),
            token_secret: "s".into(),
            consumer_key: "k".into(),
            consumer_secret: "c".into(),
        }
    }

    #[test]
    fn first_app_becomes_default() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();
        assert_eq!(store.default_app(), Some("alpha"));
        assert_eq!(store.list_apps(), vec!["alpha".to_string()]);

        store.add_app("beta", "id2", "secret2").unwrap();
        assert_eq!(store.default_app(), Some("alpha"));
        assert_eq!(store.list_apps(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn duplicate_and_missing_apps() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();

        let err = store.add_app("alpha", "x", "y").unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::DuplicateApp(n)) if n == "alpha"));
        assert!(matches!(
            store.remove_app("nope").unwrap_err(),
            Error::Store(StoreError::AppNotFound(_))
        ));
        assert!(matches!(
            store.set_default_app("nope").unwrap_err(),
            Error::Store(StoreError::AppNotFound(_))
        ));
        assert!(matches!(
            store.update_app("nope", Some("a"), None).unwrap_err(),
            Error::Store(StoreError::AppNotFound(_))
        ));
    }

    #[test]
    fn update_app_is_partial() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();
        store.update_app("alpha", Some(""), Some("new")).unwrap();
        let app = store.app("alpha").unwrap();
        assert_eq!(app.client_id, "id");
        assert_eq!(app.client_secret, "new");
    }

    #[test]
    fn removing_default_reassigns_or_clears() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "", "").unwrap();
        store.add_app("gamma", "", "").unwrap();
        store.add_app("beta", "", "").unwrap();

        store.remove_app("alpha").unwrap();
        assert_eq!(store.default_app(), Some("beta"));
        store.remove_app("beta").unwrap();
        store.remove_app("gamma").unwrap();
        assert_eq!(store.default_app(), None);
    }

    #[test]
    fn resolve_app_reports_origin() {
        let (_dir, mut store) = temp_store();
        let created = store.resolve_app(Some("ghost"));
        assert_eq!(created.name, "default");
        assert_eq!(created.origin, AppOrigin::CreatedDefault);

        store.add_app("alpha", "", "").unwrap();
        assert_eq!(store.resolve_app(Some("alpha")).origin, AppOrigin::Named);
        let fallback = store.resolve_app(Some(""));
        assert_eq!(fallback.name, "default");
        assert_eq!(fallback.origin, AppOrigin::Default);
        assert_eq!(store.active_app_name(Some("alpha")), Some("alpha"));
        assert_eq!(store.active_app_name(None), Some("default"));
    }

    #[test]
    fn default_user_selects_first_token() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "", "").unwrap();
        store.save_oauth2_token(None, "alice", "a1", "r1", 100).unwrap();
        store.save_oauth2_token(None, "bob", "b1", "r2", 200).unwrap();

        store.set_default_user(Some("alpha"), "bob").unwrap();
        let (user, token) = store.first_oauth2_token(None).unwrap();
        assert_eq!((user, token.access_token.as_str()), ("bob", "b1"));

        store.set_default_user(None, "alice").unwrap();
        let (user, token) = store.first_oauth2_token(Some("alpha")).unwrap();
        assert_eq!((user, token.access_token.as_str()), ("alice", "a1"));
        assert_eq!(store.oauth2_usernames(None), vec!["alice", "bob"]);
        assert_eq!(store.oauth2_token(None, "bob").unwrap().expiration_time, 200);

        let err = store.set_default_user(None, "carol").unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::UserNotFound { .. })));
        assert_eq!(store.default_user(None), Some("alice"));
    }

    #[test]
    fn clearing_default_user_token_clears_pointer() {
        let (_dir, mut store) = temp_store();
        store.save_oauth2_token(None, "alice", "a", "r", 1).unwrap();
        store.set_default_user(None, "alice").unwrap();
        store.clear_oauth2_token(None, "alice").unwrap();
        assert_eq!(store.default_user(None), None);
        assert!(!store.has_oauth2_token(None));
    }

    #[test]
    fn per_kind_tokens_target_named_app() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "", "").unwrap();
        store.add_app("beta", "", "").unwrap();

        store.save_bearer_token(Some("beta"), "B").unwrap();
        store.save_oauth1_token(Some("beta"), oauth1()).unwrap();
        assert!(!store.has_bearer_token(None));
        assert!(store.has_bearer_token(Some("beta")));
        assert_eq!(store.oauth1_token(Some("beta")).unwrap().consumer_key, "k");

        store.clear_bearer_token(Some("beta")).unwrap();
        assert!(!store.has_bearer_token(Some("beta")));
        store.clear_oauth1_token(Some("beta")).unwrap();
        assert!(!store.has_oauth1_token(Some("beta")));
    }

    #[test]
    fn clear_all_keeps_registration() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();
        store.save_bearer_token(None, "B").unwrap();
        store.save_oauth1_token(None, oauth1()).unwrap();
        store.save_oauth2_token(None, "alice", "a", "r", 1).unwrap();
        store.set_default_user(None, "alice").unwrap();

        store.clear_all(None).unwrap();
        let app = store.app("alpha").unwrap();
        assert!(!app.has_credentials());
        assert!(app.default_user.is_none());
        assert_eq!(app.client_id, "id");
    }

    #[test]
    fn round_trip_preserves_apps_and_defaults() {
        let (dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();
        store.add_app("beta", "id2", "secret2").unwrap();
        store.save_oauth2_token(Some("beta"), "bob", "b", "r", 42).unwrap();
        store.set_default_user(Some("beta"), "bob").unwrap();
        store.save_oauth1_token(Some("alpha"), oauth1()).unwrap();
        store.set_default_app("beta").unwrap();

        let reloaded = CredentialStore::load(dir.path().join(".xurl")).unwrap();
        assert_eq!(reloaded.document(), store.document());
        assert_eq!(reloaded.default_app(), Some("beta"));
        assert_eq!(reloaded.default_user(Some("beta")), Some("bob"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".xurl");
        let mut store = CredentialStore::load(&path).unwrap();
        store.save_bearer_token(None, "B").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn legacy_migration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".xurl");
        fs::write(
            &path,
            r#"{"oauth2_tokens":{"alice":{"type":"oauth2","oauth2":{"access_token":"a","refresh_token":"r","expiration_time":5}}},
                "oauth1_tokens":{"type":"oauth1","oauth1":{"access_token":"t","token_secret":"s","consumer_key":"k","consumer_secret":"c"}},
                "bearer_token":{"type":"bearer","bearer":"B"}}"#,
        )
        .unwrap();

        let first = CredentialStore::load(&path).unwrap();
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("apps:"));

        let second = CredentialStore::load(&path).unwrap();
        assert_eq!(first.document(), second.document());
        assert_eq!(second.default_app(), Some("default"));
        assert_eq!(second.bearer_token(None), Some("B"));
        assert_eq!(second.oauth1_token(None), Some(&oauth1()));
        assert_eq!(second.oauth2_token(None, "alice").unwrap().access_token, "a");
    }

    #[test]
    fn unreadable_document_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".xurl");
        fs::write(&path, "apps: [broken").unwrap();
        let err = CredentialStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Migration(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "apps: [broken");
    }

    #[test]
    fn twurlrc_import_never_overwrites() {
        let (dir, mut store) = temp_store();
        store.save_bearer_token(None, "mine").unwrap();

        let rc = dir.path().join(".twurlrc");
        fs::write(
            &rc,
            "profiles:\n  me:\n    ck:\n      consumer_secret: cs\n      token: tok\n      secret: sec\nbearer_tokens:\n  ck: theirs\n",
        )
        .unwrap();

        assert!(store.import_twurlrc(&rc).unwrap());
        assert_eq!(store.bearer_token(None), Some("mine"));
        let imported = store.oauth1_token(None).unwrap();
        assert_eq!(imported.consumer_key, "ck");
        assert_eq!(imported.access_token, "tok");

        assert!(!store.import_twurlrc(&rc).unwrap());
    }

    #[test]
    fn malformed_twurlrc_leaves_file_untouched() {
        let (dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();
        let before = fs::read(store.path()).unwrap();

        let rc = dir.path().join(".twurlrc");
        fs::write(&rc, "profiles: [1, 2").unwrap();
        let err = store.import_twurlrc(&rc).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Migration(_))));
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(!store.has_oauth1_token(None));
    }

    #[test]
    fn backfill_only_fills_empty_fields_on_used_apps() {
        let (_dir, mut store) = temp_store();
        store.add_app("used", "", "explicit").unwrap();
        store.add_app("empty", "", "").unwrap();
        store.save_bearer_token(Some("used"), "B").unwrap();

        assert!(
            store
                .backfill_client_credentials(Some("ambient-id"), Some("ambient-secret"))
                .unwrap()
        );
        let used = store.app("used").unwrap();
        assert_eq!(used.client_id, "ambient-id");
        assert_eq!(used.client_secret, "explicit");
        assert!(store.app("empty").unwrap().client_id.is_empty());

        assert!(
            !store
                .backfill_client_credentials(Some("other"), Some("other"))
                .unwrap()
        );
    }

    #[test]
    fn open_backfills_and_imports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".xurl");
        fs::write(&path, r#"{"bearer_token":{"type":"bearer","bearer":"B"}}"#).unwrap();
        let rc = dir.path().join(".twurlrc");
        fs::write(&rc, "profiles:\n  me:\n    ck:\n      token: t\n      secret: s\n").unwrap();

        let options = StoreOptions {
            client_id: Some("cid".into()),
            client_secret: Some("csec".into()),
            twurlrc_path: Some(rc),
        };
        let store = CredentialStore::open(&path, &options).unwrap();
        let app = store.app("default").unwrap();
        assert_eq!(app.client_id, "cid");
        assert_eq!(app.bearer(), Some("B"));
        assert_eq!(app.oauth1().unwrap().access_token, "t");

        let reloaded = CredentialStore::load(&path).unwrap();
        assert_eq!(reloaded.document(), store.document());
    }

    #[test]
    fn open_survives_malformed_twurlrc() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".twurlrc");
        fs::write(&rc, "profiles: [oops").unwrap();
        let options = StoreOptions {
            twurlrc_path: Some(rc),
            ..StoreOptions::default()
        };
        let store = CredentialStore::open(dir.path().join(".xurl"), &options).unwrap();
        assert!(store.list_apps().is_empty());
    }

    #[test]
    fn bearer_then_clear_leaves_nothing() {
        let (_dir, mut store) = temp_store();
        store.add_app("alpha", "id", "secret").unwrap();
        store.save_bearer_token(None, "B").unwrap();
        store.clear_bearer_token(None).unwrap();
        assert!(!store.has_bearer_token(None));
        assert!(!store.has_oauth1_token(None));
        assert!(!store.has_oauth2_token(None));
    }
}
