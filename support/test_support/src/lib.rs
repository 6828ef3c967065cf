use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    RuntimeSuccess,
    FrontendError,
    BackendRuntimeError,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BenchConfig {
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpectedOutcome {
    pub exit_code: i32,
    /// Final variable values for `runtime_success` cases.
    #[serde(default)]
    pub bindings: Option<BTreeMap<String, i64>>,
    /// Substring every reported error must contain.
    #[serde(default)]
    pub error_contains: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaseSpec {
    pub class: CaseClass,
    #[serde(default)]
    pub unsupported_backends: Vec<String>,
    #[serde(default)]
    pub bench: BenchConfig,
    pub expected: ExpectedOutcome,
}

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub spec: CaseSpec,
}

impl Case {
    pub fn read_source(&self) -> Result<String> {
        fs::read_to_string(&self.program_path)
            .with_context(|| format!("Reading program of case {}", self.name))
    }

    pub fn expected_bindings(&self) -> Result<&BTreeMap<String, i64>> {
        self.spec
            .expected
            .bindings
            .as_ref()
            .with_context(|| format!("Missing expected.bindings in {}", self.name))
    }

    pub fn expected_error(&self) -> Result<&str> {
        self.spec
            .expected
            .error_contains
            .as_deref()
            .map(str::trim)
            .with_context(|| format!("Missing expected.error_contains in {}", self.name))
    }

    /// Checks that the outcome fields agree with the case class.
    pub fn validate(&self, known_backends: &[&str]) -> Result<()> {
        for backend in &self.spec.unsupported_backends {
            ensure!(
                known_backends.contains(&backend.as_str()),
                "Case {} contains unknown unsupported backend '{}'",
                self.name,
                backend
            );
        }
        if self.spec.bench.enabled {
            ensure!(
                !self.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                self.name
            );
        }
        let expected_exit = match self.spec.class {
            CaseClass::RuntimeSuccess => 0,
            CaseClass::FrontendError | CaseClass::BackendRuntimeError => 1,
        };
        ensure!(
            self.spec.expected.exit_code == expected_exit,
            "Case {} expected exit code must be {expected_exit} for {:?}",
            self.name,
            self.spec.class
        );
        match self.spec.class {
            CaseClass::RuntimeSuccess => {
                self.expected_bindings()?;
            }
            CaseClass::FrontendError | CaseClass::BackendRuntimeError => {
                self.expected_error()?;
            }
        }
        Ok(())
    }

    pub fn is_backend_unsupported(&self, backend_name: &str) -> bool {
        self.spec
            .unsupported_backends
            .iter()
            .any(|name| name == backend_name)
    }
}

pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let case_path = path.join("case.yaml");
        if !case_path.exists() {
            continue;
        }

        let program_path = path.join("program.w");
        ensure!(
            program_path.exists(),
            "Missing program.w for case {}",
            path.display()
        );

        let case_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let case_raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&case_raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;

        cases.push(Case {
            name: case_name,
            dir: path,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

/// Cases with benchmarking enabled that carry `tag`.
pub fn bench_cases(programs_dir: &Path, tag: &str) -> Result<Vec<Case>> {
    Ok(load_cases(programs_dir)?
        .into_iter()
        .filter(|case| case.spec.bench.enabled && case.spec.bench.tags.iter().any(|t| t == tag))
        .collect())
}
