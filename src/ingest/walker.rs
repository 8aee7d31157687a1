use crate::share::{join_path, ShareConnection};

/// Discover every folder under `path` on `share`.
///
/// Depth-first, post-order: sub-folders are listed before their parent and
/// `path` itself is the last element. A folder that cannot be listed is logged
/// and its subtree is skipped; the rest of the traversal continues.
pub fn recursive_fetch(conn: &dyn ShareConnection, share: &str, path: &str) -> Vec<String> {
    let mut store = Vec::new();
    fetch_into(conn, share, path, &mut store);
    log::debug!("Discovered {} folders under {}/{}", store.len(), share, path);
    store
}

fn fetch_into(conn: &dyn ShareConnection, share: &str, path: &str, store: &mut Vec<String>) {
    let entries = match conn.list_path(share, path) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("Unable to list folder {}/{}: {}", share, path, e);
            return;
        }
    };

    for entry in entries {
        if entry.is_directory && entry.filename != "." && entry.filename != ".." {
            let child = join_path(path, &entry.filename);
            fetch_into(conn, share, &child, store);
        }
    }
    store.push(path.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::fake::FakeShare;
    use crate::share::{ShareClient, ShareError};

    #[test]
    fn test_post_order_traversal() {
        let share = FakeShare::new();
        share.add_folder("root/a/a1");
        share.add_folder("root/b");
        let conn = share.connect().unwrap();

        let folders = recursive_fetch(conn.as_ref(), "share", "root");
        assert_eq!(folders, vec!["root/a/a1", "root/a", "root/b", "root"]);
    }

    #[test]
    fn test_listing_failure_cuts_subtree_only() {
        let share = FakeShare::new();
        share.add_folder("root/bad/child");
        share.add_folder("root/good");
        share.fail_listing("root/bad", ShareError::Other("access denied".to_string()));
        let conn = share.connect().unwrap();

        let folders = recursive_fetch(conn.as_ref(), "share", "root");
        assert_eq!(folders, vec!["root/good", "root"]);
    }

    #[test]
    fn test_unreadable_root_yields_nothing() {
        let share = FakeShare::new();
        let conn = share.connect().unwrap();
        assert!(recursive_fetch(conn.as_ref(), "share", "missing/deeper").is_empty());
    }

    #[test]
    fn test_repeatable() {
        let share = FakeShare::new();
        share.add_folder("root/x");
        let conn = share.connect().unwrap();
        assert_eq!(
            recursive_fetch(conn.as_ref(), "share", "root"),
            recursive_fetch(conn.as_ref(), "share", "root")
        );
    }
}
