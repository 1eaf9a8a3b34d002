//! Output path resolution — maps a logical route to its on-disk artifact.
//!
//! Rules, in order:
//! - `/` → `<root>/index.html`
//! - `/<segments>` → `<root>/<segments>/index.html`
//! - `/<base>?<key>=<value>` → `<root>/<base>-<key>=<value>/index.html`
//!
//! The query component is flattened into the directory name, so
//! `/onboarding?plan=free` and `/onboarding?plan=pro` resolve to sibling
//! directories rather than one directory holding two files. Identical route
//! strings resolve identically — last writer wins.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Resolve the artifact path for a route. Pure — no filesystem access.
pub fn resolve(route: &str, output_root: &Path) -> PathBuf {
    let trimmed = route.trim_start_matches('/');
    if trimmed.is_empty() {
        return output_root.join("index.html");
    }
    match trimmed.split_once('?') {
        Some((base, query)) => output_root.join(format!("{base}-{query}")).join("index.html"),
        None => output_root.join(trimmed).join("index.html"),
    }
}

/// Write a rendered document to its resolved path, creating any missing
/// parent directories first. Overwrites an existing artifact; never deletes
/// anything else in the output tree.
pub async fn write_artifact(
    route: &str,
    html: &str,
    output_root: &Path,
) -> std::io::Result<PathBuf> {
    let path = resolve(route, output_root);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, html).await?;
    debug!(route, path = %path.display(), bytes = html.len(), "artifact written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn root_route_maps_to_top_level_index() {
        let root = Path::new("/out");
        assert_eq!(resolve("/", root), PathBuf::from("/out/index.html"));
    }

    #[test]
    fn nested_route_maps_to_directory_index() {
        let root = Path::new("/out");
        assert_eq!(
            resolve("/services/haircut", root),
            PathBuf::from("/out/services/haircut/index.html")
        );
    }

    #[test]
    fn query_component_is_flattened_into_the_directory_name() {
        let root = Path::new("/out");
        assert_eq!(
            resolve("/onboarding?plan=pro", root),
            PathBuf::from("/out/onboarding-plan=pro/index.html")
        );
        assert_ne!(
            resolve("/onboarding?plan=pro", root),
            resolve("/onboarding?plan=free", root)
        );
    }

    #[test]
    fn query_variants_of_a_nested_route_are_siblings() {
        let root = Path::new("/out");
        let a = resolve("/a/b?x=1", root);
        let b = resolve("/a/b?x=2", root);
        assert_eq!(a, PathBuf::from("/out/a/b-x=1/index.html"));
        assert_eq!(a.parent().unwrap().parent(), b.parent().unwrap().parent());
    }

    #[test]
    fn identical_routes_resolve_identically() {
        let root = Path::new("/out");
        assert_eq!(resolve("/pricing", root), resolve("/pricing", root));
    }

    proptest! {
        // Distinct query values must never collide on disk.
        #[test]
        fn distinct_query_values_resolve_to_distinct_paths(
            base in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
            key in "[a-z]{1,6}",
            v1 in "[a-z0-9]{1,6}",
            v2 in "[a-z0-9]{1,6}",
        ) {
            prop_assume!(v1 != v2);
            let root = Path::new("/out");
            let p1 = resolve(&format!("/{base}?{key}={v1}"), root);
            let p2 = resolve(&format!("/{base}?{key}={v2}"), root);
            prop_assert_ne!(p1, p2);
        }
    }

    #[tokio::test]
    async fn write_artifact_creates_intermediate_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact("/services/haircut", "<html></html>", dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("services/haircut/index.html"));
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "<html></html>"
        );
    }

    #[tokio::test]
    async fn write_artifact_overwrites_but_never_deletes_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact("/about", "first", dir.path()).await.unwrap();
        write_artifact("/pricing", "other", dir.path()).await.unwrap();
        write_artifact("/about", "second", dir.path()).await.unwrap();

        let about = tokio::fs::read_to_string(dir.path().join("about/index.html"))
            .await
            .unwrap();
        assert_eq!(about, "second");
        assert!(dir.path().join("pricing/index.html").exists());
    }
}
