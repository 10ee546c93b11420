use serde::{Deserialize, Serialize};

/// A classified (not fetched) Terraform module source (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModuleSource {
    Local { path: String, resolved_path: String },
    Registry { hostname: String, namespace: String, name: String, provider: String, version: Option<String> },
    Github { owner: String, repo: String, path: Option<String>, git_ref: Option<String>, is_ssh: bool },
    Git { url: String, git_ref: Option<String> },
    S3 { bucket: String, region: Option<String> },
    Gcs { bucket: String, path: String },
    Unknown { raw: String },
}

/// Classify a raw `source = "..."` string from a `module` block.
pub fn classify_module_source(raw: &str) -> ModuleSource {
    let raw = raw.trim();

    if let Some(rest) = raw.strip_prefix("git::") {
        let (url, git_ref) = split_ref(rest);
        return ModuleSource::Git { url: url.to_string(), git_ref };
    }

    if raw.starts_with("git@") || (raw.contains("github.com") && raw.ends_with(".git")) {
        let is_ssh = raw.starts_with("git@");
        if let Some((owner, repo, path, git_ref)) = parse_github_shorthand(raw) {
            return ModuleSource::Github { owner, repo, path, git_ref, is_ssh };
        }
        let (url, git_ref) = split_ref(raw);
        return ModuleSource::Git { url: url.to_string(), git_ref };
    }

    if let Some(rest) = raw.strip_prefix("github.com/") {
        let (body, git_ref) = split_ref(rest);
        let mut segments = body.splitn(3, '/');
        if let (Some(owner), Some(repo)) = (segments.next(), segments.next()) {
            let path = segments.next().map(str::to_string);
            return ModuleSource::Github {
                owner: owner.to_string(),
                repo: repo.trim_end_matches(".git").to_string(),
                path,
                git_ref,
                is_ssh: false,
            };
        }
    }

    if let Some(rest) = raw.strip_prefix("s3::") {
        return parse_s3(rest);
    }
    if let Some(rest) = raw.strip_prefix("gcs::") {
        return parse_gcs(rest);
    }

    if raw.starts_with("./") || raw.starts_with("../") || (raw.starts_with('/') && !raw.contains("://")) {
        return ModuleSource::Local { path: raw.to_string(), resolved_path: normalize_local_path(raw) };
    }

    if let Some(registry) = parse_registry(raw) {
        return registry;
    }

    ModuleSource::Unknown { raw: raw.to_string() }
}

fn split_ref(s: &str) -> (&str, Option<String>) {
    match s.rsplit_once("?ref=") {
        Some((url, r)) => (url, Some(r.to_string())),
        None => (s, None),
    }
}

fn parse_github_shorthand(raw: &str) -> Option<(String, String, Option<String>, Option<String>)> {
    let body = raw.strip_prefix("git@github.com:").or_else(|| {
        raw.strip_prefix("https://github.com/").or_else(|| raw.strip_prefix("http://github.com/"))
    })?;
    let (body, git_ref) = split_ref(body);
    let body = body.trim_end_matches(".git");
    let mut segments = body.splitn(3, '/');
    let owner = segments.next()?.to_string();
    let repo = segments.next()?.to_string();
    let path = segments.next().map(str::to_string);
    Some((owner, repo, path, git_ref))
}

fn parse_s3(rest: &str) -> ModuleSource {
    // s3::https://s3-<region>.amazonaws.com/<bucket>/<key> or s3::https://<bucket>.s3.amazonaws.com/...
    if let Some(after_scheme) = rest.splitn(2, "://").nth(1) {
        let mut segments = after_scheme.splitn(2, '/');
        let host = segments.next().unwrap_or_default();
        let region = host
            .strip_prefix("s3-")
            .and_then(|h| h.split('.').next())
            .map(str::to_string);
        let bucket = segments.next().and_then(|p| p.split('/').next()).unwrap_or_default().to_string();
        return ModuleSource::S3 { bucket, region };
    }
    ModuleSource::Unknown { raw: format!("s3::{rest}") }
}

fn parse_gcs(rest: &str) -> ModuleSource {
    if let Some(after_scheme) = rest.splitn(2, "://").nth(1) {
        let mut segments = after_scheme.splitn(2, '/');
        let bucket = segments.next().unwrap_or_default().to_string();
        let path = segments.next().unwrap_or_default().to_string();
        return ModuleSource::Gcs { bucket, path };
    }
    ModuleSource::Unknown { raw: format!("gcs::{rest}") }
}

fn normalize_local_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Registry module sources: `[hostname/]namespace/name/provider[//subdir]`
fn parse_registry(raw: &str) -> Option<ModuleSource> {
    let parts: Vec<&str> = raw.split('/').collect();
    let (hostname, rest): (String, &[&str]) = if parts.len() >= 4 && parts[0].contains('.') {
        (parts[0].to_string(), &parts[1..])
    } else {
        ("registry.terraform.io".to_string(), &parts[..])
    };
    if rest.len() < 3 {
        return None;
    }
    let namespace = rest[0].to_string();
    let name = rest[1].to_string();
    let provider = rest[2].to_string();
    if !namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    Some(ModuleSource::Registry { hostname, namespace, name, provider, version: None })
}

/// A single version constraint clause: `op semver`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub op: String,
    pub version: String,
}

/// Parse a version constraint string per the grammar in spec §4.1:
/// `op ws* semver (, ws* op ws* semver)*`, default op `=`.
pub fn parse_version_constraints(raw: &str) -> Vec<VersionConstraint> {
    const OPS: &[&str] = &["!=", ">=", "<=", "~>", "=", ">", "<"];
    raw.split(',')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(|clause| {
            for op in OPS {
                if let Some(rest) = clause.strip_prefix(op) {
                    return VersionConstraint { op: op.to_string(), version: rest.trim().to_string() };
                }
            }
            VersionConstraint { op: "=".to_string(), version: clause.to_string() }
        })
        .collect()
}
