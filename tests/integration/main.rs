//! Integration tests for pipecache

use std::fs;
use std::path::Path;

/// Stored entries under a cache root, excluding the manifest
fn entry_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != "cache_manifest.json")
        .collect();
    names.sort();
    names
}

mod cli_tests {
    use super::entry_files;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use pipecache::{BoundArgs, Cache, CallArgs, CheckpointOptions, Signature};
    use predicates::prelude::*;
    use std::convert::Infallible;
    use std::path::Path;
    use tempfile::TempDir;

    fn pipecache(cwd: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("pipecache");
        cmd.current_dir(cwd)
            .env_remove("PIPECACHE_DIR")
            .env_remove("PIPECACHE_CONFIG");
        cmd
    }

    /// Run three single-entry stages into a cache at `root`
    fn seed_cache(root: &Path) {
        let cache = Cache::open(root).unwrap();
        for stage in ["step1", "step2", "step3"] {
            let label = stage.to_string();
            cache
                .checkpoint(
                    Signature::new(stage),
                    CheckpointOptions::default(),
                    move |_: &BoundArgs| Ok::<_, Infallible>(label.clone()),
                )
                .unwrap()
                .call(CallArgs::new())
                .unwrap();
        }
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Checkpointing cache"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pipecache"));
    }

    #[test]
    fn truncate_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");

        pipecache(temp.path())
            .args(["truncate", "step1", "--cache-dir"])
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("No manifest file found."))
            .stdout(predicate::str::contains("Cache truncated from checkpoint").not());

        assert!(!cache_dir.exists());
    }

    #[test]
    fn truncate_unknown_checkpoint() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        pipecache(temp.path())
            .args(["truncate", "missing_step", "--cache-dir"])
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Checkpoint 'missing_step' not found in manifest.",
            ))
            .stdout(predicate::str::contains("Cache truncated from checkpoint").not());

        assert_eq!(entry_files(&cache_dir).len(), 3);
    }

    #[test]
    fn truncate_removes_downstream() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        pipecache(temp.path())
            .args(["truncate", "step2", "--cache-dir"])
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Cache truncated from checkpoint 'step2'.",
            ));

        let remaining = entry_files(&cache_dir);
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].starts_with("step1__"));
        assert_eq!(
            Cache::open(&cache_dir).unwrap().list_checkpoints(),
            vec!["step1"]
        );
    }

    #[test]
    fn truncate_uses_env_cache_dir() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        pipecache(temp.path())
            .env("PIPECACHE_DIR", &cache_dir)
            .args(["truncate", "step1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache truncated"));

        assert!(entry_files(&cache_dir).is_empty());
    }

    #[test]
    fn truncate_uses_config_cache_dir() {
        let temp = TempDir::new().unwrap();
        seed_cache(&temp.path().join("configured"));
        std::fs::write(
            temp.path().join("pipecache.toml"),
            "[cache]\ndir = \"configured\"\n",
        )
        .unwrap();

        pipecache(temp.path())
            .args(["truncate", "step3"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache truncated"));

        assert_eq!(entry_files(&temp.path().join("configured")).len(), 2);
    }

    #[test]
    fn list_shows_manifest_order() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        pipecache(temp.path())
            .args(["list", "--format", "plain", "--cache-dir"])
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout("step1\nstep2\nstep3\n");
    }

    #[test]
    fn list_json_includes_counts() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        let output = pipecache(temp.path())
            .args(["list", "--format", "json", "--cache-dir"])
            .arg(&cache_dir)
            .output()
            .unwrap();
        assert!(output.status.success());

        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 3);
        assert_eq!(rows[0]["name"], "step1");
        assert_eq!(rows[0]["entries"], 1);
        assert_eq!(rows[2]["position"], 3);
    }

    #[test]
    fn list_missing_manifest() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .args(["list", "--cache-dir", "nowhere"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No manifest file found."));
    }

    #[test]
    fn clear_with_yes() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        pipecache(temp.path())
            .args(["clear", "--yes", "--cache-dir"])
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 3 entries"));

        assert!(entry_files(&cache_dir).is_empty());
        assert!(Cache::open(&cache_dir).unwrap().list_checkpoints().is_empty());
    }

    #[test]
    fn clear_aborts_without_confirmation() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        seed_cache(&cache_dir);

        pipecache(temp.path())
            .args(["clear", "--cache-dir"])
            .arg(&cache_dir)
            .write_stdin("n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted."));

        assert_eq!(entry_files(&cache_dir).len(), 3);
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pipecache.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("pipeline_cache"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        assert!(temp.path().join("pipecache.toml").is_file());
    }

    #[test]
    fn invalid_config_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("pipecache.toml"), "[cache\n").unwrap();

        pipecache(temp.path())
            .args(["list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn unknown_command_fails() {
        let temp = TempDir::new().unwrap();
        pipecache(temp.path())
            .arg("nonexistent-command")
            .assert()
            .failure();
    }
}

mod pipeline_tests {
    use super::entry_files;
    use pipecache::{
        ArgumentError, BoundArgs, Cache, CallArgs, CallError, Checkpoint, CheckpointOptions,
        Signature,
    };
    use serde::de::{self, Deserializer};
    use serde::ser::{self, Serializer};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    type Stage<R> = Checkpoint<Box<dyn Fn(&BoundArgs) -> Result<R, ArgumentError>>>;

    fn stage<R: 'static>(
        cache: &Cache,
        signature: Signature,
        options: CheckpointOptions,
        func: impl Fn(&BoundArgs) -> Result<R, ArgumentError> + 'static,
    ) -> Stage<R> {
        let func: Box<dyn Fn(&BoundArgs) -> Result<R, ArgumentError>> = Box::new(func);
        cache.checkpoint(signature, options, func).unwrap()
    }

    /// A value that refuses to be encoded, like a lock handle
    #[derive(Debug)]
    struct Lock;

    impl Serialize for Lock {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(ser::Error::custom("cannot encode a lock"))
        }
    }

    impl<'de> Deserialize<'de> for Lock {
        fn deserialize<D: Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
            Err(de::Error::custom("cannot decode a lock"))
        }
    }

    struct Pipeline {
        step1: Stage<String>,
        step2: Stage<String>,
        step3: Stage<String>,
        step4: Stage<Vec<String>>,
        step5: Stage<String>,
    }

    impl Pipeline {
        fn new(cache: &Cache) -> Self {
            let opts = CheckpointOptions::default;
            Self {
                step1: stage(
                    cache,
                    Signature::new("step1_user_input").param("user_text"),
                    opts(),
                    |a| Ok(a.get::<String>("user_text")?.clone()),
                ),
                step2: stage(
                    cache,
                    Signature::new("step2_enhance_text").param("text"),
                    opts(),
                    |a| Ok(a.get::<String>("text")?.to_uppercase()),
                ),
                step3: stage(
                    cache,
                    Signature::new("step3_produce_document").param("enhanced_text"),
                    opts(),
                    |a| Ok(format!("Document based on: {}", a.get::<String>("enhanced_text")?)),
                ),
                step4: stage(
                    cache,
                    Signature::new("step4_generate_additional_documents").param("document"),
                    opts(),
                    |a| {
                        let document = a.get::<String>("document")?;
                        Ok((0..3).map(|i| format!("{document} - Version {i}")).collect())
                    },
                ),
                step5: stage(
                    cache,
                    Signature::new("step5_summarize_documents").param("documents"),
                    opts(),
                    |a| {
                        let documents = a.get::<Vec<String>>("documents")?;
                        Ok(format!("Summary of documents: {}", documents.join(", ")))
                    },
                ),
            }
        }

        fn run(&self, user_text: &str) -> String {
            let text = self.step1.call(CallArgs::new().arg(user_text.to_string())).unwrap();
            let enhanced = self.step2.call(CallArgs::new().arg(text)).unwrap();
            let document = self.step3.call(CallArgs::new().arg(enhanced)).unwrap();
            let documents = self.step4.call(CallArgs::new().arg(document)).unwrap();
            self.step5.call(CallArgs::new().arg(documents)).unwrap()
        }
    }

    const EXPECTED_SUMMARY: &str = "Summary of documents: \
        Document based on: INITIAL INPUT FROM USER. - Version 0, \
        Document based on: INITIAL INPUT FROM USER. - Version 1, \
        Document based on: INITIAL INPUT FROM USER. - Version 2";

    #[test]
    fn pipeline_truncate_and_rerun() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let pipeline = Pipeline::new(&cache);

        assert_eq!(pipeline.run("Initial input from user."), EXPECTED_SUMMARY);
        assert_eq!(entry_files(temp.path()).len(), 5);

        cache.truncate("step3_produce_document").unwrap();
        assert_eq!(entry_files(temp.path()).len(), 2);
        assert_eq!(
            cache.list_checkpoints(),
            vec!["step1_user_input", "step2_enhance_text"]
        );

        assert_eq!(pipeline.run("Initial input from user."), EXPECTED_SUMMARY);
        assert_eq!(entry_files(temp.path()).len(), 5);
        assert_eq!(cache.list_checkpoints().len(), 5);
    }

    #[test]
    fn pipeline_with_different_input() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let pipeline = Pipeline::new(&cache);

        let first = pipeline.run("First input from user.");
        assert_eq!(entry_files(temp.path()).len(), 5);

        let second = pipeline.run("Second input from user.");
        assert_eq!(entry_files(temp.path()).len(), 10);
        assert_ne!(first, second);
        assert_eq!(cache.list_checkpoints().len(), 5);
    }

    #[test]
    fn same_argument_hits_without_recomputing() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let square = stage(
            &cache,
            Signature::new("test_function").param("x"),
            CheckpointOptions::default(),
            move |a| {
                counter.fetch_add(1, Ordering::SeqCst);
                let x = a.get::<i64>("x")?;
                Ok(x * x)
            },
        );

        assert_eq!(square.call(CallArgs::new().arg(3i64)).unwrap(), 9);
        assert_eq!(square.call(CallArgs::new().arg(3i64)).unwrap(), 9);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(entry_files(temp.path()).len(), 1);

        assert_eq!(square.call(CallArgs::new().kwarg("x", 3i64)).unwrap(), 9);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_checkpoint_name() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let double = stage(
            &cache,
            Signature::new("test_function").param("x"),
            CheckpointOptions::default().name("custom_checkpoint_name"),
            |a| Ok(a.get::<i64>("x")? * 2),
        );

        assert_eq!(double.call(CallArgs::new().arg(5i64)).unwrap(), 10);
        assert_eq!(cache.list_checkpoints(), vec!["custom_checkpoint_name"]);
        let files = entry_files(temp.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("custom_checkpoint_name__"));

        assert_eq!(double.call(CallArgs::new().arg(6i64)).unwrap(), 12);
        assert_eq!(entry_files(temp.path()).len(), 2);
    }

    #[test]
    fn varargs_are_part_of_the_key() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let add = stage(
            &cache,
            Signature::new("add").var_positional(),
            CheckpointOptions::default(),
            |a| Ok(a.varargs::<i64>()?.into_iter().sum::<i64>()),
        );

        assert_eq!(add.call(CallArgs::new().arg(1i64).arg(2i64)).unwrap(), 3);
        assert_eq!(add.call(CallArgs::new().arg(2i64).arg(3i64)).unwrap(), 5);
        assert_eq!(entry_files(temp.path()).len(), 2);
    }

    #[test]
    fn keyword_order_does_not_matter() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let add = stage(
            &cache,
            Signature::new("add").var_keyword(),
            CheckpointOptions::default(),
            |a| Ok(a.get::<i64>("a")? + a.get::<i64>("b")?),
        );

        assert_eq!(add.call(CallArgs::new().kwarg("a", 1i64).kwarg("b", 2i64)).unwrap(), 3);
        assert_eq!(add.call(CallArgs::new().kwarg("b", 2i64).kwarg("a", 1i64)).unwrap(), 3);
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn structured_arguments_and_results() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let pair = stage(
            &cache,
            Signature::new("complex_function").param("a").param("b"),
            CheckpointOptions::default(),
            |a| {
                Ok((
                    a.get::<HashMap<String, String>>("a")?.clone(),
                    a.get::<Vec<i64>>("b")?.clone(),
                ))
            },
        );

        let dict: HashMap<String, String> = [("key1", "value1"), ("key2", "value2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let list = vec![1i64, 2, 3];

        let first = pair
            .call(CallArgs::new().arg(dict.clone()).arg(list.clone()))
            .unwrap();
        let cached = pair.call(CallArgs::new().arg(dict.clone()).arg(list.clone())).unwrap();
        assert_eq!(first, (dict, list));
        assert_eq!(cached, first);
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn unserializable_result_fails() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let lock = stage(
            &cache,
            Signature::new("test_function"),
            CheckpointOptions::default(),
            |_| Ok(Lock),
        );

        let err = lock.call(CallArgs::new()).unwrap_err();
        assert!(err.as_cache().is_some_and(|e| e.is_serialization()));
        assert!(entry_files(temp.path()).is_empty());
        assert!(cache.list_checkpoints().is_empty());
    }

    #[test]
    fn unserializable_included_argument_fails() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let f = stage(
            &cache,
            Signature::new("test_function").param("lock_arg"),
            CheckpointOptions::default(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("result".to_string())
            },
        );

        let err = f
            .call(CallArgs::new().arg_opaque(Mutex::new(())))
            .unwrap_err();
        assert!(err.as_cache().is_some_and(|e| e.is_serialization()));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_finite_float_arguments_fail() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("f").param("x"),
            CheckpointOptions::default(),
            |a| Ok(a.get::<f64>("x")?.to_string()),
        );

        for x in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = f.call(CallArgs::new().arg(x)).unwrap_err();
            assert!(err.as_cache().is_some_and(|e| e.is_serialization()));
        }
        assert!(entry_files(temp.path()).is_empty());
    }

    #[test]
    fn non_finite_float_result_is_never_stored() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let g = stage(
            &cache,
            Signature::new("g"),
            CheckpointOptions::default(),
            |_| Ok(f64::NAN),
        );

        assert!(g.call(CallArgs::new()).is_err());
        assert!(g.call(CallArgs::new()).is_err());
        assert!(entry_files(temp.path()).is_empty());
        assert!(cache.list_checkpoints().is_empty());
    }

    #[test]
    fn stage_error_passes_through() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("needs_x").param("x"),
            CheckpointOptions::default(),
            |a| Ok(*a.get::<i64>("x")?),
        );

        match f.call(CallArgs::new().arg("not a number".to_string())) {
            Err(CallError::Stage(ArgumentError::WrongType { name, .. })) => assert_eq!(name, "x"),
            other => panic!("expected stage error, got {other:?}"),
        }
        assert!(entry_files(temp.path()).is_empty());
    }

    #[test]
    fn excluded_unserializable_argument() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").param("x").param("lock_arg"),
            CheckpointOptions::default().exclude(["lock_arg"]),
            |a| Ok(a.get::<i64>("x")? * 2),
        );

        let first = f
            .call(CallArgs::new().arg(5i64).arg_opaque(Mutex::new(())))
            .unwrap();
        assert_eq!(first, 10);
        assert_eq!(entry_files(temp.path()).len(), 1);

        let cached = f
            .call(CallArgs::new().arg(5i64).arg_opaque(Mutex::new(())))
            .unwrap();
        assert_eq!(cached, 10);
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn excluded_argument_that_affects_result_is_stale() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").param("x").param("excluded_arg"),
            CheckpointOptions::default().exclude(["excluded_arg"]),
            |a| Ok(a.get::<i64>("x")? * a.get::<i64>("excluded_arg")?),
        );

        let first = f.call(CallArgs::new().arg(5i64).arg(2i64)).unwrap();
        let second = f.call(CallArgs::new().arg(5i64).arg(3i64)).unwrap();
        assert_eq!(first, 10);
        assert_eq!(second, 10);
    }

    #[test]
    fn multiple_excluded_arguments() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function")
                .param("x")
                .param("lock_arg1")
                .param("lock_arg2"),
            CheckpointOptions::default().exclude(["lock_arg1", "lock_arg2"]),
            |a| Ok(a.get::<i64>("x")? * 2),
        );

        let result = f
            .call(
                CallArgs::new()
                    .arg(5i64)
                    .arg_opaque(Mutex::new(()))
                    .arg_opaque(Mutex::new(())),
            )
            .unwrap();
        assert_eq!(result, 10);
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn included_arguments_still_distinguish_calls() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").param("x").param("excluded_arg"),
            CheckpointOptions::default().exclude(["excluded_arg"]),
            |a| Ok(a.get::<i64>("x")? + a.get::<i64>("excluded_arg")?),
        );

        assert_eq!(f.call(CallArgs::new().arg(5i64).arg(10i64)).unwrap(), 15);
        assert_eq!(f.call(CallArgs::new().arg(6i64).arg(10i64)).unwrap(), 16);
        assert_eq!(entry_files(temp.path()).len(), 2);
    }

    #[test]
    fn excluding_unknown_argument_is_harmless() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").param("x"),
            CheckpointOptions::default().exclude(["nonexistent_arg"]),
            |a| Ok(a.get::<i64>("x")? + 1),
        );

        assert_eq!(f.call(CallArgs::new().arg(5i64)).unwrap(), 6);
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn excluded_variadic_keyword() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").param("x").var_keyword(),
            CheckpointOptions::default().exclude(["excluded_kwarg"]),
            |a| Ok(a.get::<i64>("x")? + a.opt::<i64>("excluded_kwarg")?.copied().unwrap_or(0)),
        );

        let first = f
            .call(CallArgs::new().arg(5i64).kwarg("excluded_kwarg", 10i64))
            .unwrap();
        let second = f
            .call(CallArgs::new().arg(5i64).kwarg("excluded_kwarg", 20i64))
            .unwrap();
        assert_eq!(first, 15);
        assert_eq!(second, 15);
    }

    #[test]
    fn varargs_with_excluded_keyword() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").var_positional().var_keyword(),
            CheckpointOptions::default().exclude(["excluded_arg"]),
            |a| {
                let positional: i64 = a.varargs::<i64>()?.into_iter().sum();
                let keywords = a.get::<i64>("excluded_arg")? + a.get::<i64>("included_arg")?;
                Ok(positional + keywords)
            },
        );

        let call = |excluded: i64| {
            CallArgs::new()
                .arg(1i64)
                .arg(2i64)
                .kwarg("excluded_arg", excluded)
                .kwarg("included_arg", 4i64)
        };

        assert_eq!(f.call(call(3)).unwrap(), 10);
        assert_eq!(entry_files(temp.path()).len(), 1);
        assert_eq!(f.call(call(5)).unwrap(), 10);
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn excluded_default_argument() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function")
                .param("x")
                .param_default("excluded_arg", "default".to_string()),
            CheckpointOptions::default().exclude(["excluded_arg"]),
            |a| Ok(format!("{}_{}", a.get::<i64>("x")?, a.get::<String>("excluded_arg")?)),
        );

        assert_eq!(f.call(CallArgs::new().arg(5i64)).unwrap(), "5_default");
        let second = f
            .call(CallArgs::new().arg(5i64).kwarg("excluded_arg", "changed".to_string()))
            .unwrap();
        assert_eq!(second, "5_default");
    }

    #[test]
    fn unserializable_result_with_excluded_argument_fails() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let f = stage(
            &cache,
            Signature::new("test_function").param("x"),
            CheckpointOptions::default().exclude(["x"]),
            |_| Ok(Lock),
        );

        assert!(f.call(CallArgs::new().arg(5i64)).is_err());
        assert!(entry_files(temp.path()).is_empty());
    }

    #[test]
    fn clear_cache_forces_recompute() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::open(temp.path()).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let f = stage(
            &cache,
            Signature::new("step1"),
            CheckpointOptions::default(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("data".to_string())
            },
        );

        f.call(CallArgs::new()).unwrap();
        assert_eq!(cache.clear_cache().unwrap(), 1);
        assert!(entry_files(temp.path()).is_empty());
        assert!(cache.list_checkpoints().is_empty());

        f.call(CallArgs::new()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn results_survive_a_new_handle() {
        let temp = TempDir::new().unwrap();
        {
            let cache = Cache::open(temp.path()).unwrap();
            Pipeline::new(&cache).run("Initial input from user.");
        }

        let cache = Cache::open(temp.path()).unwrap();
        assert_eq!(cache.list_checkpoints().len(), 5);
        assert_eq!(
            Pipeline::new(&cache).run("Initial input from user."),
            EXPECTED_SUMMARY
        );
        assert_eq!(entry_files(temp.path()).len(), 5);
    }
}
