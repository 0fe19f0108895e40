//! Client and environment identification sent with every request

/// `vizreg/<version>`
pub fn client_info() -> String {
    format!("vizreg/{}", env!("CARGO_PKG_VERSION"))
}

/// Semicolon-joined description of the integration, e.g.
/// `os/linux; vizreg-loader/native`
pub fn environment_info(loader_name: Option<&str>, extras: &[String]) -> String {
    let mut parts: Vec<String> = extras
        .iter()
        .filter(|part| !part.trim().is_empty())
        .cloned()
        .collect();
    if let Some(name) = loader_name {
        parts.push(format!("vizreg-loader/{}", name));
    }

    if parts.is_empty() {
        "unknown".to_string()
    } else {
        parts.join("; ")
    }
}

/// Host facts included by default
pub fn default_extras() -> Vec<String> {
    vec![format!("os/{}", std::env::consts::OS)]
}

pub fn user_agent(environment_info: &str) -> String {
    format!("{} ({})", client_info(), environment_info)
}
