/// Scopes requested by the authorization-code flow: every read and write
/// scope the CLI may need, plus offline access so a refresh token is issued.
pub const SCOPES: &[&str] = &[
    // read
    "tweet.read",
    "users.read",
    "bookmark.read",
    "follows.read",
    "list.read",
    "block.read",
    "mute.read",
    "like.read",
    "users.email",
    "dm.read",
    // write
    "tweet.write",
    "tweet.moderate.write",
    "follows.write",
    "bookmark.write",
    "block.write",
    "mute.write",
    "like.write",
    "list.write",
    "media.write",
    "dm.write",
    // other
    "offline.access",
    "space.read",
];

/// Space-separated value for the `scope` parameter.
pub fn scope_param() -> String {
    SCOPES.join(" ")
}
