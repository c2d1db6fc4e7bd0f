//! Naming helpers for subdomains, registry names and deployment directories.

use chrono::Utc;

const COPY_SUFFIX: &str = "-copy";

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "daring", "eager", "fancy", "gentle", "happy", "icy", "jolly",
    "keen", "lively", "mellow", "nimble", "proud", "quiet", "rapid", "shiny", "tidy", "vivid",
];

const NOUNS: &[&str] = &[
    "badger", "comet", "dolphin", "falcon", "garden", "harbor", "island", "lantern", "meadow",
    "nebula", "orchid", "pepper", "quartz", "river", "sparrow", "tiger", "valley", "willow",
];

/// Lowercase the name and drop everything outside `[a-z0-9-]`.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Random `adjective-noun-number` name.
pub fn random_name() -> String {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let noun = NOUNS[bytes[1] as usize % NOUNS.len()];
    let number = u16::from_le_bytes([bytes[2], bytes[3]]) % 10_000;
    format!("{}-{}-{}", adjective, noun, number)
}

/// Strip any run of trailing `-copy` suffixes and append exactly one.
pub fn copy_name(name: &str) -> String {
    let mut base = name;
    while let Some(stripped) = base.strip_suffix(COPY_SUFFIX) {
        base = stripped;
    }
    format!("{}{}", base, COPY_SUFFIX)
}

/// Fresh timestamped deployment directory name.
pub fn deployment_dir() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("app_{}_{}", Utc::now().timestamp_millis(), &suffix[..6])
}

/// Deployment directory name for a duplicated app.
pub fn copy_deployment_dir() -> String {
    format!("{}_copy", deployment_dir())
}
