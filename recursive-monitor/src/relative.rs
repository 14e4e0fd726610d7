//! Relative path computation between the monitored root and an event path.

use std::collections::VecDeque;
use std::path::Path;

/// Express `path` relative to the directory `root`.
///
/// `path_is_dir` must be supplied by the caller: the path may already be gone
/// from disk by the time an event is translated, so it is never probed.
/// The result has no leading or trailing separator and is empty when `path`
/// is the root itself.
pub fn relative_path(root: &Path, path: &Path, path_is_dir: bool) -> String {
    let from = normalize(&root.to_string_lossy(), true);
    let to = normalize(&path.to_string_lossy(), path_is_dir);

    let from: Vec<&str> = from.split('/').collect();
    let to: Vec<&str> = to.split('/').collect();
    let mut relative: VecDeque<&str> = to.iter().copied().collect();

    for (depth, segment) in from.iter().enumerate() {
        if to.get(depth) == Some(segment) {
            relative.pop_front();
            continue;
        }

        let remaining = from.len() - depth;
        if remaining > 1 {
            for _ in 1..remaining {
                relative.push_front("..");
            }
            break;
        }
    }

    let joined = Vec::from(relative).join("/");
    joined.trim_end_matches('/').to_string()
}

/// Use `/` separators; directories end with exactly one separator.
fn normalize(path: &str, is_dir: bool) -> String {
    let path = path.replace('\\', "/");
    if is_dir {
        format!("{}/", path.trim_end_matches('/'))
    } else {
        path
    }
}
