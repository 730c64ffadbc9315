//! Integration tests for MinBuild

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Command isolated from any user config and cache
    fn minbuild(sandbox: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("minbuild");
        cmd.env("MINBUILD_CONFIG", sandbox.join("absent.toml"))
            .env("MINBUILD_CACHE_ROOT", sandbox.join("cache"))
            .env_remove("CURRENT_BRANCH");
        cmd
    }

    struct Workspace {
        dir: TempDir,
        inputs: String,
        output: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let src = dir.path().join("src");
            fs::create_dir_all(&src).unwrap();
            fs::write(src.join("a.cs"), "class A {}").unwrap();
            fs::write(src.join("b.cs"), "class B {}").unwrap();
            let inputs = format!(
                "{};{}",
                src.join("a.cs").display(),
                src.join("b.cs").display()
            );
            let output = dir.path().join("bin").join("core.dll");
            Self { dir, inputs, output }
        }

        fn step(&self, command: &str) -> Command {
            let mut cmd = minbuild(self.dir.path());
            cmd.args([command, "--project", "Core", "--build-config", "Debug", "list"])
                .args(["--inputs", &self.inputs])
                .args(["--outputs", &self.output.display().to_string()]);
            cmd
        }

        fn build(&self) {
            fs::create_dir_all(self.output.parent().unwrap()).unwrap();
            fs::write(&self.output, "compiled").unwrap();
        }
    }

    /// A check or commit for project `App` under `Debug`, driven by the
    /// given resolver arguments
    fn app_step(sandbox: &Path, command: &str, resolver: &[String]) -> Command {
        let mut cmd = minbuild(sandbox);
        cmd.args([command, "--project", "App", "--build-config", "Debug"])
            .args(resolver);
        cmd
    }

    fn path_arg(path: &Path) -> String {
        path.display().to_string()
    }

    #[test]
    fn help_displays() {
        let sandbox = TempDir::new().unwrap();
        minbuild(sandbox.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental-build artifact cache"));
    }

    #[test]
    fn version_displays() {
        let sandbox = TempDir::new().unwrap();
        minbuild(sandbox.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("minbuild"));
    }

    #[test]
    fn config_show() {
        let sandbox = TempDir::new().unwrap();
        minbuild(sandbox.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_init_writes_file_once() {
        let sandbox = TempDir::new().unwrap();
        minbuild(sandbox.path())
            .args(["config", "init"])
            .assert()
            .success();
        assert!(sandbox.path().join("absent.toml").is_file());

        minbuild(sandbox.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn check_commit_restore_cycle() {
        let ws = Workspace::new();

        ws.step("check")
            .assert()
            .success()
            .stdout(predicate::str::contains("status: miss"));

        ws.build();
        ws.step("commit")
            .assert()
            .success()
            .stdout(predicate::str::contains("status: committed"));

        fs::remove_file(&ws.output).unwrap();
        ws.step("check")
            .assert()
            .success()
            .stdout(predicate::str::contains("status: hit"));
        assert_eq!(fs::read_to_string(&ws.output).unwrap(), "compiled");

        ws.step("check")
            .assert()
            .success()
            .stdout(predicate::str::contains("status: up-to-date"));

        fs::write(ws.dir.path().join("src").join("b.cs"), "class B { int x; }").unwrap();
        ws.step("check")
            .assert()
            .success()
            .stdout(predicate::str::contains("status: miss"));
    }

    #[test]
    fn second_commit_is_already_present() {
        let ws = Workspace::new();
        ws.build();
        ws.step("commit").assert().success();
        ws.step("commit")
            .assert()
            .success()
            .stdout(predicate::str::contains("status: already-present"));
    }

    #[test]
    fn skipped_project_never_hashes() {
        let ws = Workspace::new();
        fs::write(
            ws.dir.path().join("minbuild.toml"),
            "[cache]\nskip_projects = \"legacy#core\"\n",
        )
        .unwrap();
        ws.step("check")
            .env("MINBUILD_CONFIG", ws.dir.path().join("minbuild.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("status: skipped"))
            .stdout(predicate::str::contains("key: -"));
    }

    #[test]
    fn missing_input_fails_with_hint() {
        let ws = Workspace::new();
        fs::remove_file(ws.dir.path().join("src").join("a.cs")).unwrap();
        ws.step("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Declared input file is missing"))
            .stderr(predicate::str::contains("create_missing_inputs"));
    }

    #[test]
    fn hash_is_stable_and_config_sensitive() {
        let ws = Workspace::new();
        let a = ws.dir.path().join("src").join("a.cs");
        let key = |config: &str| {
            let output = minbuild(ws.dir.path())
                .args(["hash", "--build-config", config])
                .arg(&a)
                .output()
                .unwrap();
            assert!(output.status.success());
            String::from_utf8(output.stdout).unwrap().trim().to_string()
        };

        assert_eq!(key("Debug").len(), 64);
        assert_eq!(key("Debug"), key("Debug"));
        assert_ne!(key("Debug"), key("Release"));
    }

    #[test]
    fn inspect_rejects_bad_key() {
        let sandbox = TempDir::new().unwrap();
        minbuild(sandbox.path())
            .args(["inspect", "--kind", "list", "not-hex"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache key"));
    }

    #[test]
    fn resolve_prints_list_inputs() {
        let ws = Workspace::new();
        minbuild(ws.dir.path())
            .args(["resolve", "list", "--inputs", &ws.inputs, "--outputs"])
            .arg(&ws.output)
            .assert()
            .success()
            .stdout(predicate::str::contains("INP:").and(predicate::str::contains("a.cs")))
            .stdout(predicate::str::contains("OUT:").and(predicate::str::contains("core.dll")));
    }

    #[test]
    fn makefile_check_commit_restore_cycle() {
        let ws = TempDir::new().unwrap();
        let project = ws.path().join("project");
        fs::create_dir_all(project.join("include")).unwrap();
        fs::write(project.join("main.cpp"), "#include \"util.h\"\nint main() {}\n").unwrap();
        fs::write(project.join("util.cpp"), "#include <vcl.h>\n").unwrap();
        fs::write(project.join("include").join("util.h"), "#pragma once\n").unwrap();
        let makefile = project.join("app.mak");
        fs::write(
            &makefile,
            "SOURCE=main.cpp \\\n\tutil.cpp\n\
             INCLUDEPATH=include;$(BCB)\\include\n\
             LFLAGS=-D\"\" -Gi -x\n\
             TARGET=app.dll\n",
        )
        .unwrap();
        let resolver = vec!["makefile".to_string(), "--makefile".to_string(), path_arg(&makefile)];
        let dll = project.join("app.dll");
        let lib = project.join("app.lib");

        app_step(ws.path(), "check", &resolver)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: miss"));

        fs::write(&dll, "dll bytes").unwrap();
        fs::write(&lib, "import library").unwrap();
        app_step(ws.path(), "commit", &resolver)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: committed"));

        fs::remove_file(&dll).unwrap();
        fs::remove_file(&lib).unwrap();
        app_step(ws.path(), "check", &resolver)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: hit"));
        assert_eq!(fs::read_to_string(&dll).unwrap(), "dll bytes");
        assert_eq!(fs::read_to_string(&lib).unwrap(), "import library");

        fs::write(project.join("include").join("util.h"), "#pragma once\nint x;\n").unwrap();
        app_step(ws.path(), "check", &resolver)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: miss"));
    }

    #[test]
    fn makefile_package_target_declares_companion_library() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("pkg.cpp"), "int f();\n").unwrap();
        let makefile = ws.path().join("pkg.mak");
        fs::write(&makefile, "SOURCE=pkg.cpp\nLFLAGS=-Gl\nTARGET=pkg.bpl\n").unwrap();

        minbuild(ws.path())
            .args(["resolve", "makefile", "--makefile"])
            .arg(&makefile)
            .assert()
            .success()
            .stdout(predicate::str::contains("pkg.bpl"))
            .stdout(predicate::str::contains("pkg.lib"))
            .stdout(predicate::str::contains("pkg.bpi").not())
            .stdout(predicate::str::contains("pkg.mak"));
    }

    #[test]
    fn compile_log_stash_commit_restore_cycle() {
        let ws = TempDir::new().unwrap();
        let root = ws.path().join("repo");
        let src = root.join("src");
        let tlogs = root.join("obj").join("app.tlog");
        let exe = root.join("out").join("app.exe");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&tlogs).unwrap();
        fs::write(src.join("a.cpp"), "#include \"a.h\"\n").unwrap();
        fs::write(src.join("a.h"), "#pragma once\n").unwrap();

        let declared = path_arg(&src.join("a.cpp"));
        let check_args = vec![
            "compile-log".to_string(),
            "--inputs".to_string(),
            declared.clone(),
            "--root-dir".to_string(),
            path_arg(&root),
        ];
        let mut commit_args = check_args.clone();
        commit_args.extend(["--log-dir".to_string(), path_arg(&tlogs)]);

        // Nothing stashed yet
        app_step(ws.path(), "check", &check_args)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: miss"))
            .stdout(predicate::str::contains("key: -"));

        // Compile and link
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, "linked").unwrap();
        fs::write(
            tlogs.join("CL.read.1.tlog"),
            format!("^{}\n{}\n{}\n", declared, declared, path_arg(&src.join("a.h"))),
        )
        .unwrap();
        fs::write(
            tlogs.join("CL.write.1.tlog"),
            format!("{}\n", path_arg(&root.join("obj").join("a.obj"))),
        )
        .unwrap();
        fs::write(tlogs.join("link.write.1.tlog"), format!("{}\n", path_arg(&exe))).unwrap();

        app_step(ws.path(), "commit", &commit_args)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: committed"));

        fs::remove_file(&exe).unwrap();
        app_step(ws.path(), "check", &check_args)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: hit"));
        assert_eq!(fs::read_to_string(&exe).unwrap(), "linked");
        let source_maps = fs::read_dir(exe.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "mapped"))
            .count();
        assert_eq!(source_maps, 1);

        fs::write(src.join("a.h"), "#pragma once\nint y;\n").unwrap();
        app_step(ws.path(), "check", &check_args)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: miss"));
    }

    #[test]
    fn compile_log_commit_without_link_log_is_skipped() {
        let ws = TempDir::new().unwrap();
        let tlogs = ws.path().join("tlogs");
        fs::create_dir_all(&tlogs).unwrap();
        let source = ws.path().join("a.cpp");
        fs::write(&source, "int a;\n").unwrap();
        fs::write(tlogs.join("CL.read.1.tlog"), format!("{}\n", path_arg(&source))).unwrap();

        let args = vec![
            "compile-log".to_string(),
            "--inputs".to_string(),
            path_arg(&source),
            "--log-dir".to_string(),
            path_arg(&tlogs),
        ];
        app_step(ws.path(), "commit", &args)
            .assert()
            .success()
            .stdout(predicate::str::contains("status: skipped"))
            .stdout(predicate::str::contains("no link tracking log"));
    }

    #[test]
    fn compile_log_missing_declared_input_fails() {
        let ws = TempDir::new().unwrap();
        let args = vec![
            "compile-log".to_string(),
            "--inputs".to_string(),
            path_arg(&ws.path().join("gone.cpp")),
        ];
        app_step(ws.path(), "check", &args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Declared input file is missing"));
    }
}
