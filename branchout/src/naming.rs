use crate::clock::Clock;
use rand::Rng;

/// Prefix of every generated feature branch.
pub const BRANCH_PREFIX: &str = "feature/";

/// Returns `explicit` when it is set and non-blank, otherwise a freshly
/// generated name.
pub fn resolve_branch_name(explicit: Option<&str>, workspace_name: &str, clock: &Clock) -> String {
    match explicit.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => generate_branch_name(workspace_name, clock),
    }
}

/// `feature/<workspace>-<yyyymmddHHMMSS>-<8 hex>`; the random suffix keeps
/// two names distinct even when the clock reads the same second.
pub fn generate_branch_name(workspace_name: &str, clock: &Clock) -> String {
    let timestamp = clock.now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen();
    format!(
        "{}{}-{}-{:08x}",
        BRANCH_PREFIX,
        sanitize(workspace_name),
        timestamp,
        suffix
    )
}

/// Whitespace becomes `_`; characters and sequences git refuses in ref names
/// are dropped. Slash-separated components survive, without empty ones,
/// leading dots or a `.lock` suffix.
pub fn sanitize(workspace_name: &str) -> String {
    let cleaned: String = workspace_name
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_control() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\') {
                None
            } else {
                Some(c)
            }
        })
        .collect();

    let mut collapsed = cleaned.replace("@{", "@");
    while collapsed.contains("..") || collapsed.contains("@{") {
        collapsed = collapsed.replace("..", ".").replace("@{", "@");
    }

    let components: Vec<&str> = collapsed
        .split('/')
        .map(sanitize_component)
        .filter(|component| !component.is_empty())
        .collect();
    if components.is_empty() {
        "workspace".to_string()
    } else {
        components.join("/")
    }
}

fn sanitize_component(component: &str) -> &str {
    let mut component = component.trim_start_matches('.');
    loop {
        let trimmed = component.trim_end_matches('.');
        let trimmed = trimmed.strip_suffix(".lock").unwrap_or(trimmed);
        if trimmed.len() == component.len() {
            return component;
        }
        component = trimmed;
    }
}
