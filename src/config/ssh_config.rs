// ABOUTME: Reader for OpenSSH client configuration files (ssh_config).
// ABOUTME: Supports Host blocks with glob patterns and falls back to OpenSSH defaults.

use super::HostConfig;
use std::io;
use std::path::{Path, PathBuf};

const SYSTEM_CONFIG_PATH: &str = "/etc/ssh/ssh_config";

/// Values reported for keys that no matching block sets.
const DEFAULTS: &[(&str, &str)] = &[
    ("port", "22"),
    ("pubkeyauthentication", "yes"),
    (
        "identityfile",
        "~/.ssh/id_ed25519,~/.ssh/id_ecdsa,~/.ssh/id_rsa",
    ),
];

/// Host-alias configuration backed by one or more ssh_config files.
///
/// Files are consulted in load order and the first value found for a key
/// wins, matching how OpenSSH layers the user and system configuration.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    files: Vec<ParsedFile>,
}

#[derive(Debug, Clone, Default)]
struct ParsedFile {
    blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
struct Block {
    patterns: Vec<Pattern>,
    /// `Match` blocks are kept only so their entries are not attributed to
    /// the preceding `Host` block; they never match.
    is_match: bool,
    entries: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Pattern {
    glob: String,
    negated: bool,
}

impl SshConfig {
    /// Parse a single ssh_config document.
    ///
    /// Parsing is lenient: lines that cannot be interpreted are skipped.
    pub fn parse(contents: &str) -> Self {
        Self {
            files: vec![ParsedFile::parse(contents)],
        }
    }

    /// Load and layer the given files. Missing files are skipped.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match std::fs::read_to_string(path) {
                Ok(contents) => {
                    tracing::debug!(path = %path.display(), "loaded ssh config");
                    files.push(ParsedFile::parse(&contents));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to read ssh config {}: {}", path.display(), e);
                }
            }
        }
        Self { files }
    }

    /// Load `~/.ssh/config` followed by the system-wide configuration.
    pub fn load_default(home_dir: Option<&Path>) -> Self {
        let mut paths: Vec<PathBuf> = Vec::new();
        if let Some(home) = home_dir {
            paths.push(home.join(".ssh").join("config"));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        Self::load(&paths)
    }

    fn lookup(&self, alias: &str, key: &str) -> Option<&str> {
        self.files
            .iter()
            .flat_map(|file| file.blocks.iter())
            .filter(|block| block.matches(alias))
            .flat_map(|block| block.entries.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl HostConfig for SshConfig {
    fn get(&self, alias: &str, key: &str) -> String {
        let key = key.to_ascii_lowercase();
        if let Some(value) = self.lookup(alias, &key) {
            return value.to_string();
        }
        DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .unwrap_or_default()
    }
}

impl ParsedFile {
    fn parse(contents: &str) -> Self {
        // Entries before the first Host line apply to every host.
        let mut blocks = vec![Block::global()];

        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = split_entry(line) else {
                tracing::debug!(line = index + 1, "skipping unparsable ssh config line");
                continue;
            };

            match key.as_str() {
                "host" => blocks.push(Block::host(&value)),
                "match" => blocks.push(Block::matcher()),
                "include" => {
                    tracing::debug!(line = index + 1, "ssh config Include is not supported");
                }
                _ => {
                    if let Some(block) = blocks.last_mut() {
                        block.entries.push((key, value));
                    }
                }
            }
        }

        Self { blocks }
    }
}

impl Block {
    fn global() -> Self {
        Self {
            patterns: vec![Pattern {
                glob: "*".to_string(),
                negated: false,
            }],
            is_match: false,
            entries: Vec::new(),
        }
    }

    fn host(value: &str) -> Self {
        let patterns = value
            .split_whitespace()
            .map(|p| match p.strip_prefix('!') {
                Some(glob) => Pattern {
                    glob: glob.to_string(),
                    negated: true,
                },
                None => Pattern {
                    glob: p.to_string(),
                    negated: false,
                },
            })
            .collect();
        Self {
            patterns,
            is_match: false,
            entries: Vec::new(),
        }
    }

    fn matcher() -> Self {
        Self {
            patterns: Vec::new(),
            is_match: true,
            entries: Vec::new(),
        }
    }

    fn matches(&self, alias: &str) -> bool {
        if self.is_match {
            return false;
        }
        let mut matched = false;
        for pattern in &self.patterns {
            if glob_match(&pattern.glob, alias) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// Split a config line into a lowercased key and its value.
///
/// Accepts both `Key value` and `Key=value`, and strips one pair of
/// surrounding double quotes from the value.
fn split_entry(line: &str) -> Option<(String, String)> {
    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (key, rest) = line.split_at(split_at);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    if key.is_empty() || rest.is_empty() {
        return None;
    }
    let value = rest
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(rest);
    Some((key.to_ascii_lowercase(), value.to_string()))
}

/// Match `text` against a glob supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
