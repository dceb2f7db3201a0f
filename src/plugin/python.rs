//! Loader that asks the host interpreter for a module's environments.
//!
//! The interpreter imports the module, calls its `provide_environments()`
//! entry point and prints the result as JSON. Every load runs in a fresh
//! interpreter, so a reload is the same as a first load.

use log::debug;

use crate::runtime::Runtime;

use super::{LoadError, PluginLoader, ProvidedEnv};

const ENTRY_POINT: &str = "provide_environments";

// Exit codes: 3 = import failed, 4 = no entry point, 5 = entry point raised
// or returned something that cannot be serialized. Factories that are not
// strings are reported as `module:qualname`.
// Must not contain single quotes (it is passed single-quoted to the shell).
const LOADER_SCRIPT: &str = r#"
import importlib, json, sys
try:
    module = importlib.import_module(sys.argv[1])
except ImportError as e:
    sys.stderr.write(str(e))
    sys.exit(3)
provide = getattr(module, "provide_environments", None)
if provide is None:
    sys.exit(4)
def reference(factory):
    if factory is None or isinstance(factory, str):
        return factory
    module = getattr(factory, "__module__", type(factory).__module__)
    name = getattr(factory, "__qualname__", type(factory).__qualname__)
    return "{}:{}".format(module, name)
try:
    envs = [{"id": i, "entry_point": reference(e)} for i, e in provide()]
    output = json.dumps(envs)
except Exception as e:
    sys.stderr.write(repr(e))
    sys.exit(5)
sys.stdout.write(output)
"#;

pub struct PythonLoader<'a, R: Runtime> {
    runtime: &'a R,
    python: String,
}

impl<'a, R: Runtime> PythonLoader<'a, R> {
    pub fn new(runtime: &'a R, python: impl Into<String>) -> Self {
        Self {
            runtime,
            python: python.into(),
        }
    }

    fn command(&self, module: &str) -> String {
        format!("{} -c '{}' {}", self.python, LOADER_SCRIPT, module)
    }
}

impl<R: Runtime> PluginLoader for PythonLoader<'_, R> {
    #[tracing::instrument(skip(self))]
    fn load(&self, module: &str, reload: bool) -> Result<Vec<ProvidedEnv>, LoadError> {
        if reload {
            debug!("Reloading module {}", module);
        }
        let output = self
            .runtime
            .run_capture(&self.command(module))
            .map_err(|e| LoadError::Failed(e.to_string()))?;

        if output.success() {
            return serde_json::from_str(output.stdout.trim()).map_err(|e| {
                LoadError::Failed(format!("invalid {} output: {}", ENTRY_POINT, e))
            });
        }
        let stderr = output.stderr.trim().to_string();
        match output.code {
            3 => Err(LoadError::NotFound(stderr)),
            4 => Err(LoadError::NotPlugin),
            5 => Err(LoadError::Broken(stderr)),
            code => Err(LoadError::Failed(format!(
                "interpreter exited with code {}: {}",
                code, stderr
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CommandOutput, MockRuntime};

    fn runtime_returning(code: i32, stdout: &'static str, stderr: &'static str) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_run_capture()
            .withf(|cmd: &str| cmd.starts_with("python3 -c '") && cmd.ends_with("' alice_envpack"))
            .times(1)
            .returning(move |_| {
                Ok(CommandOutput {
                    code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                })
            });
        runtime
    }

    #[test]
    fn test_script_has_no_single_quotes() {
        assert!(!LOADER_SCRIPT.contains('\''));
        assert!(LOADER_SCRIPT.contains(ENTRY_POINT));
    }

    #[test]
    fn test_load_parses_provided_envs() {
        let runtime = runtime_returning(
            0,
            r#"[{"id": "alice/EnvA-v0", "entry_point": "alice_envpack.envs:EnvA"}, {"id": "alice/EnvB-v1", "entry_point": null}]"#,
            "",
        );
        let loader = PythonLoader::new(&runtime, "python3");

        let envs = loader.load("alice_envpack", false).unwrap();
        assert_eq!(
            envs,
            vec![
                ProvidedEnv {
                    id: "alice/EnvA-v0".into(),
                    entry_point: Some("alice_envpack.envs:EnvA".into()),
                },
                ProvidedEnv::new("alice/EnvB-v1"),
            ]
        );
    }

    #[test]
    fn test_load_classifies_failures() {
        let runtime = runtime_returning(3, "", "No module named 'alice_envpack'");
        let loader = PythonLoader::new(&runtime, "python3");
        let err = loader.load("alice_envpack", false).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert!(!err.is_declared_plugin());

        let runtime = runtime_returning(4, "", "");
        let loader = PythonLoader::new(&runtime, "python3");
        assert_eq!(loader.load("alice_envpack", true), Err(LoadError::NotPlugin));

        let runtime = runtime_returning(5, "", "RuntimeError('boom')");
        let loader = PythonLoader::new(&runtime, "python3");
        let err = loader.load("alice_envpack", false).unwrap_err();
        assert_eq!(err, LoadError::Broken("RuntimeError('boom')".into()));
        assert!(err.is_declared_plugin());
    }

    #[test]
    fn test_script_serializes_inside_guard() {
        let guard = LOADER_SCRIPT.find("except Exception").unwrap();
        assert!(LOADER_SCRIPT.find("json.dumps").unwrap() < guard);
        assert!(LOADER_SCRIPT.contains("__qualname__"));
    }

    #[test]
    fn test_load_failure_exit_code_is_failed() {
        let runtime = runtime_returning(1, "", "Fatal Python error");
        let loader = PythonLoader::new(&runtime, "python3");
        let err = loader.load("alice_envpack", false).unwrap_err();
        assert!(matches!(err, LoadError::Failed(ref msg) if msg.contains("code 1")));
        assert!(!err.is_declared_plugin());
    }

    // Runs the script with a real interpreter when one is on the PATH.
    #[cfg(unix)]
    #[test]
    fn test_load_class_factories_with_real_interpreter() {
        use crate::runtime::RealRuntime;

        if std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_err()
        {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("alice_envpack.py"),
            "class EnvA:\n    pass\n\n\
             def provide_environments():\n    \
             return [(\"alice/EnvA-v0\", EnvA), (\"alice/EnvB-v0\", \"alice_envpack:make_b\"), (\"alice/EnvC-v0\", None)]\n",
        )
        .unwrap();

        let runtime = RealRuntime;
        let python = format!("PYTHONPATH=\"{}\" python3", dir.path().display());
        let loader = PythonLoader::new(&runtime, python);
        let envs = loader.load("alice_envpack", false).unwrap();

        assert_eq!(
            envs,
            vec![
                ProvidedEnv {
                    id: "alice/EnvA-v0".into(),
                    entry_point: Some("alice_envpack:EnvA".into()),
                },
                ProvidedEnv {
                    id: "alice/EnvB-v0".into(),
                    entry_point: Some("alice_envpack:make_b".into()),
                },
                ProvidedEnv::new("alice/EnvC-v0"),
            ]
        );
    }

    #[test]
    fn test_load_rejects_garbled_output() {
        let runtime = runtime_returning(0, "Traceback ...", "");
        let loader = PythonLoader::new(&runtime, "python3");
        assert!(matches!(
            loader.load("alice_envpack", false),
            Err(LoadError::Failed(_))
        ));
    }
}
