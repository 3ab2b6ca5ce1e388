// SPDX-License-Identifier: GPL-3.0-only

//! Recording command runner for unit tests
//!
//! Report output is keyed by the `-o` field list an invocation asks
//! for, so one fake can answer permission, activation, and size probes
//! independently; non-report commands fall back to a per-program table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{LvmError, Result};
use crate::invoker::{CommandRunner, LvmCommand};

pub(crate) struct FakeRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    field_outputs: Mutex<HashMap<String, String>>,
    program_outputs: Mutex<HashMap<String, String>>,
    fail_matching: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            field_outputs: Mutex::new(HashMap::new()),
            program_outputs: Mutex::new(HashMap::new()),
            fail_matching: Mutex::new(Vec::new()),
        })
    }

    /// Canned report output for invocations selecting `fields` via `-o`.
    pub fn set_output(&self, fields: &str, output: &str) {
        self.field_outputs
            .lock()
            .unwrap()
            .insert(fields.to_string(), output.to_string());
    }

    /// Canned output for a program that is not a field report.
    pub fn set_program_output(&self, program: &str, output: &str) {
        self.program_outputs
            .lock()
            .unwrap()
            .insert(program.to_string(), output.to_string());
    }

    /// Fail any call whose program name or argument contains `needle`.
    pub fn fail_matching(&self, needle: &str) {
        self.fail_matching.lock().unwrap().push(needle.to_string());
    }

    /// Arguments of every recorded call to `program`, in order.
    pub fn calls_for(&self, program: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == program)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Program names of every recorded call, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn record(&self, program: &str, args: &[&str]) -> Result<()> {
        self.calls.lock().unwrap().push((
            program.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        ));
        let failures = self.fail_matching.lock().unwrap();
        let hit = failures
            .iter()
            .any(|needle| program.contains(needle.as_str()) || args.iter().any(|a| a.contains(needle.as_str())));
        if hit {
            return Err(LvmError::CommandFailed {
                command: program.to_string(),
                status: 5,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn output_for(&self, program: &str, args: &[&str]) -> String {
        if let Some(pos) = args.iter().position(|a| *a == "-o") {
            if let Some(fields) = args.get(pos + 1) {
                if let Some(output) = self.field_outputs.lock().unwrap().get(*fields) {
                    return output.clone();
                }
            }
        }
        self.program_outputs
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .unwrap_or_default()
    }
}

impl CommandRunner for Arc<FakeRunner> {
    fn invoke(&self, command: LvmCommand, args: &[&str]) -> Result<String> {
        let program = command.binary();
        self.record(program, args)?;
        Ok(self.output_for(program, args))
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        self.record(program, args)?;
        Ok(self.output_for(program, args))
    }
}
