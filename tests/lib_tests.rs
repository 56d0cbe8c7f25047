use refinery::engine::classifier::{Classification, SourceFileClassifier};
use refinery::engine::tools::{
    file_name, glob_match, glob_match_icase, is_under_folder, normalize_rel, path_relative_to,
    path_to_db_string, replace_extension, should_include_in_walk, strip_root,
};
use refinery::utils::{RefineryToml, apply_file_to_opts};
use refinery::{
    BuilderDescriptor, BuilderRegistry, DependencyGraph, Opts, PipelineConfig, PlatformScope,
    ProductOutputFlags,
};
use std::path::PathBuf;

// --- path_relative_to ---

#[test]
fn test_path_relative_under_base() {
    let base = PathBuf::from("/foo/bar");
    let path = PathBuf::from("/foo/bar/baz/qux");
    assert_eq!(
        path_relative_to(&path, &base),
        Some(PathBuf::from("baz/qux"))
    );
}

#[test]
fn test_path_relative_not_under_base() {
    let base = PathBuf::from("/foo/bar");
    let path = PathBuf::from("/other/qux");
    assert_eq!(path_relative_to(&path, &base), None);
}

// --- path_to_db_string / normalize_rel ---

#[test]
fn test_path_to_db_string_normalizes_backslashes() {
    assert_eq!(
        path_to_db_string(&PathBuf::from("src\\main.rs")),
        "src/main.rs"
    );
}

#[test]
fn test_normalize_rel_strips_dots_and_slashes() {
    assert_eq!(normalize_rel("./art//wall.png/"), "art/wall.png");
    assert_eq!(normalize_rel("a/./b"), "a/b");
    assert_eq!(normalize_rel(""), "");
}

// --- folder and root helpers ---

#[test]
fn test_is_under_folder_is_component_wise() {
    assert!(is_under_folder("folder/a.txt", "folder"));
    assert!(is_under_folder("folder", "folder"));
    assert!(is_under_folder("folder/sub/a.txt", "folder"));
    assert!(!is_under_folder("folder1/a.txt", "folder"));
    assert!(!is_under_folder("other/folder/a.txt", "folder"));
    assert!(is_under_folder("anything", ""));
}

#[test]
fn test_strip_root() {
    assert_eq!(
        strip_root("Cache/IntermediateAssets/a.b", "Cache/IntermediateAssets"),
        Some("a.b")
    );
    assert_eq!(strip_root("CacheX/a.b", "Cache"), None);
    assert_eq!(strip_root("Cache", "Cache"), None);
}

#[test]
fn test_replace_extension() {
    assert_eq!(replace_extension("test.stage1", "stage2"), "test.stage2");
    assert_eq!(replace_extension("dir.v2/file", ".out"), "dir.v2/file.out");
    assert_eq!(replace_extension("a/b.tar.gz", "zip"), "a/b.tar.zip");
    assert_eq!(replace_extension(".hidden", "x"), ".hidden.x");
}

#[test]
fn test_file_name() {
    assert_eq!(file_name("a/b/c.png"), "c.png");
    assert_eq!(file_name("c.png"), "c.png");
}

// --- glob_match ---

#[test]
fn test_glob_star_and_question() {
    assert!(glob_match("*.txt", "a.txt"));
    assert!(!glob_match("*.txt", "a.tx"));
    assert!(glob_match("file?.rs", "file1.rs"));
    assert!(!glob_match("file?.rs", "file12.rs"));
    assert!(glob_match("*", ""));
}

#[test]
fn test_glob_negation_prefix_ignored() {
    assert!(glob_match("!*.log", "debug.log"));
}

#[test]
fn test_glob_icase_for_builder_patterns() {
    assert!(glob_match_icase("*.PNG", "wall.png"));
    assert!(!glob_match("*.PNG", "wall.png"));
}

// --- should_include_in_walk ---

#[test]
fn test_should_include_excludes_root_and_skip() {
    let root = PathBuf::from("/proj");
    let db = PathBuf::from("/proj/.refinery");
    assert!(!should_include_in_walk(&root, &root, &[], &[]));
    assert!(!should_include_in_walk(&db, &root, &[db.clone()], &[]));
    assert!(should_include_in_walk(
        &PathBuf::from("/proj/a.png"),
        &root,
        &[db],
        &[]
    ));
}

#[test]
fn test_should_include_exclude_patterns_and_hidden_files() {
    let root = PathBuf::from("/proj");
    let exclude = vec!["*.tmp".to_string(), ".git".to_string()];
    assert!(!should_include_in_walk(
        &PathBuf::from("/proj/x.tmp"),
        &root,
        &[],
        &exclude
    ));
    assert!(!should_include_in_walk(
        &PathBuf::from("/proj/.git"),
        &root,
        &[],
        &exclude
    ));
    assert!(!should_include_in_walk(
        &PathBuf::from("/proj/.DS_Store"),
        &root,
        &[],
        &[]
    ));
    assert!(should_include_in_walk(
        &PathBuf::from("/proj/x.png"),
        &root,
        &[],
        &exclude
    ));
}

#[test]
fn test_should_include_excludes_contents_of_excluded_folder() {
    let root = PathBuf::from("/proj");
    let exclude = vec![".git".to_string(), "build/*.log".to_string()];
    assert!(!should_include_in_walk(
        &PathBuf::from("/proj/.git/objects/ab"),
        &root,
        &[],
        &exclude
    ));
    assert!(!should_include_in_walk(
        &PathBuf::from("/proj/build/out.log"),
        &root,
        &[],
        &exclude
    ));
    assert!(should_include_in_walk(
        &PathBuf::from("/proj/src/.gitkeep"),
        &root,
        &[],
        &exclude
    ));
}

// --- registry ---

#[test]
fn test_match_builders_orders_by_priority_then_registration() {
    let mut r = BuilderRegistry::new();
    let flags = ProductOutputFlags::PRODUCT_ASSET;
    r.register(BuilderDescriptor::new("low", &["*.png"], PlatformScope::Common, flags))
        .unwrap();
    r.register(
        BuilderDescriptor::new("high", &["*.png"], PlatformScope::Common, flags).with_priority(5),
    )
    .unwrap();
    r.register(BuilderDescriptor::new("also_low", &["*.PNG"], PlatformScope::Common, flags))
        .unwrap();
    r.register(BuilderDescriptor::new("txt", &["*.txt"], PlatformScope::Common, flags))
        .unwrap();

    let ids: Vec<&str> = r
        .match_builders("art/wall.png")
        .into_iter()
        .map(|b| b.id.as_str())
        .collect();
    assert_eq!(ids, vec!["high", "low", "also_low"]);
    assert!(r.match_builders("readme.md").is_empty());
}

#[test]
fn test_match_builders_full_path_pattern() {
    let mut r = BuilderRegistry::new();
    r.register(BuilderDescriptor::new(
        "levels",
        &["levels/*.map"],
        PlatformScope::Common,
        ProductOutputFlags::PRODUCT_ASSET,
    ))
    .unwrap();
    assert_eq!(r.match_builders("levels/one.map").len(), 1);
    assert!(r.match_builders("maps/one.map").is_empty());
}

#[test]
fn test_registry_remove() {
    let mut r = BuilderRegistry::new();
    r.register(BuilderDescriptor::new(
        "a",
        &["*.a"],
        PlatformScope::Common,
        ProductOutputFlags::PRODUCT_ASSET,
    ))
    .unwrap();
    assert!(r.remove("a").is_some());
    assert!(r.remove("a").is_none());
    assert!(r.is_empty());
}

// --- classifier ---

#[test]
fn test_classifier_splits_cache_trees() {
    let config = PipelineConfig::default();
    let graph = DependencyGraph::new();
    let c = SourceFileClassifier::new(&config, &graph);

    assert_eq!(
        c.classify("Cache/IntermediateAssets/sub/a.b"),
        Classification::Synthetic("sub/a.b".into())
    );
    assert_eq!(
        c.classify("Cache/pc/sub/a.out"),
        Classification::Product {
            platform: "pc".into(),
            path: "sub/a.out".into()
        }
    );
    assert_eq!(
        c.classify("art/a.png"),
        Classification::Authored("art/a.png".into())
    );
    assert_eq!(
        c.classify("CacheFiles/a.png"),
        Classification::Authored("CacheFiles/a.png".into())
    );
    assert!(c.is_intermediate_location("Cache/IntermediateAssets/a.b"));
    assert!(!c.is_intermediate_location("a.b"));
}

#[test]
fn test_classification_logical_path() {
    let product = Classification::Product {
        platform: "pc".into(),
        path: "a.out".into(),
    };
    assert_eq!(product.logical(), "pc/a.out");
    assert_eq!(Classification::Synthetic("a.b".into()).logical(), "a.b");
}

// --- project file ---

#[test]
fn test_refinery_toml_builders_and_settings() {
    let doc = r#"
[settings]
platforms = ["pc", "linux"]
hash = true
workers = 3

[[builder]]
id = "compile"
patterns = ["*.src"]
output = "intermediate"
extension = "obj"

[[builder]]
id = "pack"
patterns = ["*.obj", "*.raw"]
scope = "per_platform"
output = "product"
priority = 2
extension = "pak"
"#;
    let file = RefineryToml::parse(doc).unwrap();
    let builders = file.builders();
    assert_eq!(builders.len(), 2);
    assert_eq!(builders[0].descriptor.id, "compile");
    assert!(builders[0].descriptor.is_intermediate());
    assert_eq!(builders[0].descriptor.scope, PlatformScope::Common);
    assert_eq!(builders[0].extension, "obj");
    assert_eq!(builders[1].descriptor.scope, PlatformScope::PerPlatform);
    assert_eq!(builders[1].descriptor.priority, 2);
    assert_eq!(builders[1].descriptor.patterns.len(), 2);

    let mut opts = Opts::default();
    apply_file_to_opts(&file, &mut opts);
    assert_eq!(opts.pipeline.platforms, vec!["pc", "linux"]);
    assert!(opts.with_hash);
    assert_eq!(opts.workers, Some(3));
}

#[test]
fn test_refinery_toml_rejects_unknown_output_kind() {
    let doc = r#"
[[builder]]
id = "x"
patterns = ["*.x"]
output = "sideways"
extension = "y"
"#;
    assert!(RefineryToml::parse(doc).is_err());
}
