#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};

    use crate::analyzer::UpdateMode;
    use crate::document::{DirtyRanges, Document, DocumentOptions};
    use crate::syntax::{ByteRange, TextEdit};
    use crate::text::Position;

    const SOURCE: &str = "<?php\nclass Foo\n{\n    public function run()\n    {\n        $v = 1;\n    }\n}\n";

    fn new_doc(debounce_ms: u64) -> Arc<Document> {
        Document::new(DocumentOptions::new("file:///tmp/Foo.php").with_debounce(Duration::from_millis(debounce_ms)))
    }

    /// Replace the first `find` in the document's content as a partial edit.
    fn apply(doc: &Arc<Document>, find: &str, replacement: &str) -> Result<TextEdit> {
        let content = doc.content();
        let start = content.find(find).ok_or_else(|| anyhow!("'{}' not found", find))?;
        let (next, edit) = TextEdit::replace(&content, ByteRange::new(start, start + find.len()), replacement);
        doc.update(next, Some(edit));
        Ok(edit)
    }

    fn v_types(doc: &Document) -> Vec<String> {
        doc.index()
            .function_scope("Foo::run")
            .map(|s| s.type_names_at_or_before("v", 6))
            .unwrap_or_default()
    }

    #[test]
    fn test_full_update_analyzes_synchronously() {
        let doc = new_doc(500);
        assert!(!doc.has_tree());
        doc.update(SOURCE.to_string(), None);
        assert!(doc.has_tree());
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.analysis_runs(), 1);
        assert_eq!(doc.last_update_mode(), Some(UpdateMode::Full));
        assert_eq!(v_types(&doc), vec!["int"]);
        assert!(doc.index().class_by_name("Foo").is_some());
    }

    #[test]
    fn test_unchanged_full_update_is_skipped() {
        let doc = new_doc(500);
        doc.update(SOURCE.to_string(), None);
        doc.update(SOURCE.to_string(), None);
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.analysis_runs(), 1);
    }

    #[test]
    fn test_partial_edit_without_runtime_runs_inline() -> Result<()> {
        let doc = new_doc(500);
        doc.update(SOURCE.to_string(), None);
        apply(&doc, "$v = 1;", "$v = 'a';")?;
        assert_eq!(doc.analysis_runs(), 2);
        assert!(!doc.is_dirty());
        assert_eq!(doc.last_update_mode(), Some(UpdateMode::Incremental));
        assert_eq!(v_types(&doc), vec!["string"]);
        Ok(())
    }

    #[test]
    fn test_line_count_change_forces_full_rebuild() -> Result<()> {
        let doc = new_doc(500);
        doc.update(SOURCE.to_string(), None);
        apply(&doc, "$v = 1;", "$w = 1;\n        $v = 2.0;")?;
        assert_eq!(doc.last_update_mode(), Some(UpdateMode::Full));
        let index = doc.index();
        let scope = index.function_scope("run").expect("run scope");
        assert_eq!(scope.type_names_at_or_before("v", 7), vec!["float"]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rapid_edits_coalesce_into_one_analysis() -> Result<()> {
        let doc = new_doc(50);
        doc.update(SOURCE.to_string(), None);
        assert_eq!(doc.analysis_runs(), 1);

        apply(&doc, "$v = 1;", "$v = 2;")?;
        apply(&doc, "$v = 2;", "$v = 3;")?;
        apply(&doc, "$v = 3;", "$v = [];")?;
        apply(&doc, "$v = [];", "$v = 'done';")?;
        assert!(doc.is_dirty());
        assert_eq!(v_types(&doc), vec!["int"], "index stays stale until the debounce fires");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(doc.analysis_runs(), 2);
        assert!(!doc.is_dirty());
        assert_eq!(doc.version(), 5);
        assert_eq!(v_types(&doc), vec!["string"]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_superseded_edit_never_publishes() -> Result<()> {
        let doc = new_doc(100);
        doc.update(SOURCE.to_string(), None);
        apply(&doc, "$v = 1;", "$v = 'a';")?;

        let replaced = SOURCE.replace("$v = 1;", "$v = 1.5;");
        doc.update(replaced, None);
        assert_eq!(doc.analysis_runs(), 2);
        assert_eq!(v_types(&doc), vec!["float"]);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(doc.analysis_runs(), 2);
        assert_eq!(v_types(&doc), vec!["float"]);
        Ok(())
    }

    #[test]
    fn test_get_node_at_returns_detached_snapshot() -> Result<()> {
        let doc = new_doc(500);
        doc.update(SOURCE.to_string(), None);

        let at = doc.get_node_at(Position::new(5, 9)).expect("node");
        let node = at.node().expect("named node");
        assert_eq!(node.kind(), "name");
        assert_eq!(at.node_text(), Some("v"));
        assert_eq!(node.parent().map(|p| p.kind()), Some("variable_name"));

        doc.update(SOURCE.replace("$v", "$renamed"), None);
        assert_eq!(at.content, SOURCE);
        assert!(at.index.function_scope("run").is_some_and(|s| s.variables.contains_key("v")));
        assert!(!doc.content().contains("$v "));
        Ok(())
    }

    #[test]
    fn test_read_sees_consistent_triple() {
        let doc = new_doc(500);
        doc.update(SOURCE.to_string(), None);
        let (kind, len, classes) = doc.read(|view| {
            (
                view.tree.map(|t| t.root_node().kind().to_string()),
                view.content.len(),
                view.index.classes.len(),
            )
        });
        assert_eq!(kind.as_deref(), Some("program"));
        assert_eq!(len, SOURCE.len());
        assert_eq!(classes, 1);
    }

    #[test]
    fn test_close_releases_tree_and_next_update_rebuilds() -> Result<()> {
        let doc = new_doc(500);
        doc.update(SOURCE.to_string(), None);
        doc.close();
        assert!(!doc.has_tree());
        assert_eq!(doc.version(), 2);
        assert!(doc.get_node_at(Position::new(0, 0)).is_none());

        doc.update(SOURCE.to_string(), None);
        assert!(doc.has_tree());
        assert_eq!(doc.last_update_mode(), Some(UpdateMode::Full));
        Ok(())
    }

    #[test]
    fn test_dirty_ranges_shift_merge_and_reflow() {
        let base = "0123456789abcdef";
        let mut dirty = DirtyRanges::default();

        let (c1, e1) = TextEdit::replace(base, ByteRange::new(2, 4), "xx");
        dirty.record(&e1);
        let (c2, e2) = TextEdit::replace(&c1, ByteRange::new(8, 9), "yyy");
        dirty.record(&e2);
        assert_eq!(dirty.ranges(), &[ByteRange::new(2, 4), ByteRange::new(8, 11)]);

        let (c3, e3) = TextEdit::replace(&c2, ByteRange::new(4, 4), "zz");
        dirty.record(&e3);
        assert_eq!(dirty.ranges(), &[ByteRange::new(2, 6), ByteRange::new(10, 13)]);
        assert!(!dirty.is_empty());
        assert!(!dirty.needs_full_rebuild());

        let (_, e4) = TextEdit::replace(&c3, ByteRange::new(0, 0), "\n");
        dirty.record(&e4);
        assert_eq!(dirty.ranges()[0], ByteRange::new(0, 1));
        assert_eq!(dirty.ranges()[1], ByteRange::new(3, 7));
        assert!(dirty.needs_full_rebuild());
    }
}
