//! Build and release information.

/// Release version of this build.
pub const RELEASE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit, injected at build time through `DBSERVER_GIT_HASH`.
pub fn git_hash() -> &'static str {
    match option_env!("DBSERVER_GIT_HASH") {
        Some(hash) if !hash.is_empty() => hash,
        _ => "None",
    }
}

/// Build profile.
pub fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

/// Version block printed by `-V`.
pub fn raw_info() -> String {
    format!(
        "Release Version: {}\nGit Commit Hash: {}\nBuild Profile: {}",
        RELEASE_VERSION,
        git_hash(),
        build_profile()
    )
}

/// Print [`raw_info`] to stdout.
pub fn print_raw_info() {
    println!("{}", raw_info());
}
