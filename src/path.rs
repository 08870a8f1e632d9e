//! Portable store paths.
//!
//! Dataset files record store paths relative to their own directory so the
//! descriptor and its stores can be moved together. Paths are handled as
//! strings with `/` separators, so descriptors written on one platform read
//! back on another. Three kinds of roots are understood: `/`, drive letters
//! (`C:`) and network shares (`//server/share`).

use std::path::{Path, PathBuf};

use crate::core::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Root {
    None,
    Unix,
    Drive(char),
    Share(String),
}

impl Root {
    fn render(&self) -> String {
        match self {
            Root::None => String::new(),
            Root::Unix => "/".to_string(),
            Root::Drive(letter) => format!("{letter}:/"),
            Root::Share(share) => share.clone(),
        }
    }
}

struct Parsed {
    root: Root,
    parts: Vec<String>,
}

impl Parsed {
    fn render(&self) -> String {
        let joined = self.parts.join("/");
        match &self.root {
            Root::None if joined.is_empty() => ".".to_string(),
            Root::None => joined,
            Root::Share(_) if !joined.is_empty() => format!("{}/{}", self.root.render(), joined),
            root => root.render() + &joined,
        }
    }
}

fn parse(raw: &str) -> Parsed {
    let s = raw.replace('\\', "/");
    let (root, rest) = if let Some(unc) = s.strip_prefix("//") {
        let mut pieces = unc.splitn(3, '/');
        let server = pieces.next().unwrap_or_default();
        let share = pieces.next().unwrap_or_default();
        let rest = pieces.next().unwrap_or_default().to_string();
        (Root::Share(format!("//{server}/{share}")), rest)
    } else if let Some(rest) = s.strip_prefix('/') {
        (Root::Unix, rest.to_string())
    } else {
        let bytes = s.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            let letter = (bytes[0] as char).to_ascii_uppercase();
            (Root::Drive(letter), s[2..].to_string())
        } else {
            (Root::None, s.clone())
        }
    };

    let mut parts: Vec<String> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                // Cannot climb above a root.
                _ if root != Root::None => {}
                _ => parts.push("..".to_string()),
            },
            other => parts.push(other.to_string()),
        }
    }
    Parsed { root, parts }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Lexically normalizes a path: `/` separators, no `.` segments, `..`
/// resolved where possible.
pub fn normalize(path: &Path) -> PathBuf {
    PathBuf::from(parse(&path_str(path)).render())
}

/// Makes `path` absolute against the current directory and normalizes it.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let parsed = parse(&path_str(path));
    if parsed.root != Root::None {
        return Ok(PathBuf::from(parsed.render()));
    }
    let cwd = std::env::current_dir()?;
    Ok(normalize(&cwd.join(path)))
}

/// Portable form of `path` as seen from `relative_to_dir`.
///
/// Relative (with `..` segments as needed) when both share a root. Paths on
/// another drive, on a network share, or given against a relative directory
/// come back in absolute normalized form.
pub fn to_portable(path: &Path, relative_to_dir: &Path) -> String {
    let target = parse(&path_str(path));
    let base = parse(&path_str(relative_to_dir));
    if target.root == Root::None
        || base.root == Root::None
        || target.root != base.root
        || matches!(target.root, Root::Share(_))
    {
        return target.render();
    }

    let common = target
        .parts
        .iter()
        .zip(base.parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.parts.len() - common)
        .collect();
    parts.extend(target.parts[common..].iter().cloned());
    Parsed {
        root: Root::None,
        parts,
    }
    .render()
}

/// Inverse of [`to_portable`]. Rooted inputs are only normalized.
pub fn from_portable(portable: &str, relative_to_dir: &Path) -> PathBuf {
    let parsed = parse(portable);
    if parsed.root != Root::None {
        return PathBuf::from(parsed.render());
    }
    let joined = format!("{}/{}", path_str(relative_to_dir).replace('\\', "/"), portable);
    PathBuf::from(parse(&joined).render())
}
