#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use anyhow::Result;

    use crate::autoload::{AutoloadConfig, ProjectSettings};
    use crate::config::IndexerConfig;
    use crate::store::{normalize_path, DocumentStore};

    fn write_class(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
        let path = dir.join(format!("{}.php", name));
        std::fs::write(&path, format!("<?php\n{}\n", body))?;
        Ok(path)
    }

    fn store_with_capacity(max_documents: usize) -> Arc<DocumentStore> {
        let config = IndexerConfig {
            max_documents,
            ..IndexerConfig::default()
        };
        DocumentStore::new(config, ProjectSettings::default())
    }

    #[test]
    fn test_get_loads_analyzes_and_caches() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_class(dir.path(), "Widget", "class Widget { public function spin() {} }")?;
        let store = store_with_capacity(10);

        let doc = store.get(&path).expect("loaded");
        assert!(doc.index().class_by_name("Widget").is_some());
        assert!(doc.uri().starts_with("file://"));
        assert!(store.contains(&path));
        assert!(!store.is_open(&path));

        let again = store.get(&dir.path().join(".").join("Widget.php")).expect("cached");
        assert!(Arc::ptr_eq(&doc, &again));
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_not_cached() {
        let store = store_with_capacity(10);
        assert!(store.get(Path::new("/definitely/not/here.php")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_closed_entry_stays_until_evicted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let a = write_class(dir.path(), "A", "class A {}")?;
        let b = write_class(dir.path(), "B", "class B {}")?;
        let store = store_with_capacity(1);

        let opened = store.open(&a, "<?php\nclass A { public $x; }\n".to_string());
        assert!(store.is_open(&a));
        assert_eq!(opened.index().property_types("x").len(), 1);

        store.close(&a);
        assert!(store.contains(&a));
        assert!(!store.is_open(&a));

        assert!(store.get(&b).is_some());
        assert!(!store.contains(&a));
        assert!(store.contains(&b));
        Ok(())
    }

    #[test]
    fn test_eviction_respects_pinning_under_concurrent_gets() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_with_capacity(3);

        let mut pinned = Vec::new();
        for i in 0..2 {
            let path = write_class(dir.path(), &format!("Pinned{}", i), &format!("class Pinned{} {{}}", i))?;
            store.open(&path, format!("<?php\nclass Pinned{} {{}}\n", i));
            pinned.push(path);
        }
        let mut others = Vec::new();
        for i in 0..12 {
            others.push(write_class(dir.path(), &format!("Other{}", i), &format!("class Other{} {{}}", i))?);
        }

        let pinned = &pinned;
        let store_ref = &store;
        std::thread::scope(|s| {
            for chunk in others.chunks(3) {
                s.spawn(move || {
                    for path in chunk {
                        assert!(store_ref.get(path).is_some());
                        for pin in pinned {
                            assert!(store_ref.is_open(pin), "pinned entry evicted");
                        }
                    }
                });
            }
        });

        assert!(store.len() <= 3);
        for pin in pinned {
            assert!(store.is_open(pin));
        }
        Ok(())
    }

    #[test]
    fn test_configure_reaches_cached_documents() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_class(dir.path(), "Cfg", "class Cfg {}")?;
        let store = store_with_capacity(10);
        let doc = store.get(&path).expect("loaded");

        let autoload = AutoloadConfig::default().with_psr4("App\\", "src");
        store.configure(autoload.clone(), Some(dir.path().to_path_buf()));

        let expected = ProjectSettings::new(autoload, Some(dir.path().to_path_buf()));
        assert_eq!(*doc.settings(), expected);
        assert_eq!(*store.settings(), expected);
        Ok(())
    }

    #[test]
    fn test_cross_file_inheritance_cycle_terminates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src)?;
        let a = write_class(&src, "A", "namespace Cyc;\nclass A extends B {}")?;
        write_class(&src, "B", "namespace Cyc;\nclass B extends A {}")?;

        let settings = ProjectSettings::new(
            AutoloadConfig::default().with_psr4("Cyc\\", "src"),
            Some(dir.path().to_path_buf()),
        );
        let store = DocumentStore::new(IndexerConfig::default(), settings);
        let doc = store.get(&a).expect("loaded");
        let index = doc.index();
        let class = index.class_by_name("Cyc\\A").expect("A");
        assert_eq!(class.extends, vec!["Cyc\\B"]);
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[test]
    fn test_normalize_path_is_lexical() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c.php")), PathBuf::from("/a/c.php"));
        assert_eq!(normalize_path(Path::new("../x/./y")), PathBuf::from("../x/y"));
    }
}
