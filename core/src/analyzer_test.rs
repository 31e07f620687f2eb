#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use tree_sitter::{Parser, Tree};

    use crate::analysis::{AnalysisContext, SourceFile};
    use crate::analyzer::{StaticAnalyzer, UpdateMode};
    use crate::autoload::ProjectSettings;
    use crate::index::IndexedTree;
    use crate::syntax::{php_parser, ByteRange, TextEdit};

    const URI: &str = "file:///work/Foo.php";

    const SOURCE: &str = r#"<?php
namespace App;

use App\Models\Baz;

class Foo
{
    private Baz $otherProp;
    protected int $count;

    public function baz()
    {
        $y = new Bar();
        $z = 'text';
        $y = $this->otherProp;
        $fn = function (int $n) {
            $inner = $n;
        };
    }

    public function other(string $s)
    {
        $copy = $s;
    }
}

class Qux extends Foo
{
}
"#;

    struct Harness {
        parser: Parser,
        content: String,
        tree: Tree,
        settings: ProjectSettings,
        analyzer: StaticAnalyzer,
    }

    impl Harness {
        fn new(src: &str) -> Result<Self> {
            let mut parser = php_parser()?;
            let tree = parser.parse(src, None).ok_or_else(|| anyhow!("parse failed"))?;
            let mut harness = Self {
                parser,
                content: src.to_string(),
                tree,
                settings: ProjectSettings::default(),
                analyzer: StaticAnalyzer::new(),
            };
            let ctx = AnalysisContext::new(
                SourceFile {
                    uri: URI,
                    content: &harness.content,
                    tree: &harness.tree,
                },
                &harness.settings,
                None,
            );
            harness.analyzer.update(&ctx, &[]);
            Ok(harness)
        }

        /// Replace the first occurrence of `find` and run an update with its dirty range.
        fn edit(&mut self, find: &str, replacement: &str) -> Result<Arc<IndexedTree>> {
            let start = self
                .content
                .find(find)
                .ok_or_else(|| anyhow!("'{}' not in source", find))?;
            let (content, edit) =
                TextEdit::replace(&self.content, ByteRange::new(start, start + find.len()), replacement);
            self.tree.edit(&edit.to_input_edit());
            self.tree = self
                .parser
                .parse(&content, Some(&self.tree))
                .ok_or_else(|| anyhow!("reparse failed"))?;
            self.content = content;

            let ctx = AnalysisContext::new(
                SourceFile {
                    uri: URI,
                    content: &self.content,
                    tree: &self.tree,
                },
                &self.settings,
                None,
            );
            Ok(self.analyzer.update(&ctx, &[edit.dirty_range()]))
        }

        fn full(&self) -> Result<IndexedTree> {
            let mut parser = php_parser()?;
            let tree = parser
                .parse(&self.content, None)
                .ok_or_else(|| anyhow!("parse failed"))?;
            let ctx = AnalysisContext::new(
                SourceFile {
                    uri: URI,
                    content: &self.content,
                    tree: &tree,
                },
                &self.settings,
                None,
            );
            Ok(ctx.build_index())
        }
    }

    #[test]
    fn test_full_rebuild_is_idempotent() -> Result<()> {
        let harness = Harness::new(SOURCE)?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Full));
        assert!(harness.analyzer.is_built());
        let first = harness.full()?;
        let second = harness.full()?;
        assert_eq!(first, second);
        assert_eq!(*harness.analyzer.index(), first);
        Ok(())
    }

    #[test]
    fn test_body_edit_is_incremental_and_matches_full() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        let updated = harness.edit("new Bar()", "new Car()")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);

        let scope = updated.function_scope("Foo::baz").expect("baz scope");
        assert_eq!(scope.type_names_at_or_before("y", 13), vec!["App\\Car"]);
        assert!(updated.types.contains_key("App\\Car"));
        assert!(!updated.types.contains_key("App\\Bar"));
        Ok(())
    }

    #[test]
    fn test_property_edit_reinfers_dependent_scopes() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        let before = harness.analyzer.index();
        assert_eq!(
            before.function_scope("Foo::baz").expect("baz").type_names_at_or_before("y", 15),
            vec!["App\\Models\\Baz"]
        );

        let updated = harness.edit("private Baz $otherProp", "private Zab $otherProp")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        assert_eq!(
            updated.function_scope("Foo::baz").expect("baz").type_names_at_or_before("y", 15),
            vec!["App\\Zab"]
        );
        // The previous snapshot is untouched.
        assert_eq!(before.property_types("otherProp")[0].type_name, "App\\Models\\Baz");
        Ok(())
    }

    #[test]
    fn test_closure_edit_matches_full() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        let updated = harness.edit("$inner = $n;", "$inner = 42;")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        let closure = updated.function_scope("anonymous@16").expect("closure scope");
        assert_eq!(closure.type_names_at_or_before("inner", 17), vec!["int"]);
        Ok(())
    }

    #[test]
    fn test_namespace_or_import_edit_forces_full_rebuild() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        let updated = harness.edit("namespace App;", "namespace Apx;")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Full));
        assert_eq!(*updated, harness.full()?);
        assert!(updated.class_by_name("Apx\\Foo").is_some());

        harness.edit("use App\\Models\\Baz;", "use App\\Models\\Zab;")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Full));
        Ok(())
    }

    #[test]
    fn test_edit_outside_declarations_forces_full_rebuild() -> Result<()> {
        let src = "<?php\n$a = 1;\nfunction f() { $b = 2; }\n";
        let mut harness = Harness::new(src)?;
        harness.edit("$a = 1;", "$a = 3;")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Full));
        Ok(())
    }

    #[test]
    fn test_several_ranges_in_one_update() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        let start_a = harness.content.find("'text'").ok_or_else(|| anyhow!("missing"))?;
        let (content, first) = TextEdit::replace(&harness.content, ByteRange::new(start_a, start_a + 6), "1.5   ");
        let start_b = content.find("$copy = $s").ok_or_else(|| anyhow!("missing"))?;
        let (content, second) = TextEdit::replace(&content, ByteRange::new(start_b, start_b + 10), "$copy = 77");

        harness.tree.edit(&first.to_input_edit());
        harness.tree.edit(&second.to_input_edit());
        harness.tree = harness
            .parser
            .parse(&content, Some(&harness.tree))
            .ok_or_else(|| anyhow!("reparse failed"))?;
        harness.content = content;

        let ctx = AnalysisContext::new(
            SourceFile {
                uri: URI,
                content: &harness.content,
                tree: &harness.tree,
            },
            &harness.settings,
            None,
        );
        let ranges = [first.dirty_range(), second.dirty_range(), first.dirty_range()];
        let updated = harness.analyzer.update(&ctx, &ranges);
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        Ok(())
    }

    #[test]
    fn test_class_header_edit_keeps_direct_parents_until_full_rebuild() -> Result<()> {
        let src = "<?php\nclass A extends X {}\nclass B extends C {}\nclass C {}\n";
        let mut harness = Harness::new(src)?;
        let updated = harness.edit("extends X", "extends B")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(updated.class_by_name("A").expect("A").extends, vec!["B"]);
        assert_eq!(updated.class_by_name("B").expect("B").extends, vec!["C"]);

        let full = harness.full()?;
        assert_eq!(full.class_by_name("A").expect("A").extends, vec!["B", "C"]);
        Ok(())
    }

    #[test]
    fn test_same_line_property_declarations_survive_an_edit() -> Result<()> {
        let src = "<?php\nclass A {\n    public int $a; public string $b;\n}\n";
        let mut harness = Harness::new(src)?;
        let updated = harness.edit("int $a", "float $a")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        assert_eq!(updated.property_types("a")[0].type_name, "float");
        assert_eq!(updated.property_types("b")[0].type_name, "string");
        Ok(())
    }

    #[test]
    fn test_one_line_class_keeps_properties_on_body_edit() -> Result<()> {
        let src = "<?php\nclass A { public int $a; public function f($x) { $y = 1; } }\nfunction g() { $z = 1; }\n";
        let mut harness = Harness::new(src)?;
        let updated = harness.edit("$y = 1", "$y = 'one'")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        assert_eq!(updated.property_types("a")[0].type_name, "int");
        assert_eq!(
            updated.function_scope("A::f").expect("f").type_names_at_or_before("y", 2),
            vec!["string"]
        );
        assert!(updated.function_scope("g").is_some());
        Ok(())
    }

    #[test]
    fn test_promoted_parameter_edit_reinfers_other_methods() -> Result<()> {
        let src = r#"<?php
class Service
{
    public function __construct(private Clock $clock, int $retries)
    {
    }

    public function now()
    {
        $c = $this->clock;
    }
}
"#;
        let mut harness = Harness::new(src)?;
        let updated = harness.edit("private Clock $clock", "private Timer $clock")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        assert_eq!(updated.property_types("clock")[0].type_name, "Timer");
        assert_eq!(
            updated.function_scope("Service::now").expect("now").type_names_at_or_before("c", 10),
            vec!["Timer"]
        );
        assert!(!updated.types.contains_key("Clock"));
        Ok(())
    }

    #[test]
    fn test_class_rename_matches_full_rebuild() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        let updated = harness.edit("class Foo\n", "class Boo\n")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Incremental));
        assert_eq!(*updated, harness.full()?);
        assert!(updated.function_scope("Boo::baz").is_some());
        assert!(updated.function_scope("Foo::baz").is_none());
        assert_eq!(updated.property_types("otherProp")[0].type_name, "App\\Models\\Baz");
        assert!(updated.types.contains_key("App\\Models\\Baz"));
        Ok(())
    }

    #[test]
    fn test_reset_forces_full_build() -> Result<()> {
        let mut harness = Harness::new(SOURCE)?;
        harness.analyzer.reset();
        assert!(!harness.analyzer.is_built());
        harness.edit("new Bar()", "new Car()")?;
        assert_eq!(harness.analyzer.last_mode(), Some(UpdateMode::Full));
        Ok(())
    }
}
