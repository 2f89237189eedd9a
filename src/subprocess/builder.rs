use std::collections::HashMap;
use std::time::Duration;

use crate::subprocess::ProcessCommand;

/// Fluent construction of a [`ProcessCommand`]
pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                env: HashMap::new(),
                timeout: None,
                stdin: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    /// Add variables on top of the minimal environment the child starts with
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.command
            .env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Kill the child if it runs longer than `timeout`; `None` waits forever
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command.timeout = timeout;
        self
    }

    /// Bytes written to the child's stdin before it is waited on
    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.command.stdin = Some(input);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_worker_command() {
        let env = HashMap::from([("CHUNKLOOP_LOG_LEVEL".to_string(), "debug".to_string())]);
        let command = ProcessCommandBuilder::new("chunkloop")
            .arg("worker")
            .envs(&env)
            .timeout(Some(Duration::from_secs(5)))
            .stdin(vec![7, 8])
            .build();

        assert_eq!(command.program, "chunkloop");
        assert_eq!(command.args, vec!["worker"]);
        assert_eq!(command.env.get("CHUNKLOOP_LOG_LEVEL").map(String::as_str), Some("debug"));
        assert_eq!(command.timeout, Some(Duration::from_secs(5)));
        assert_eq!(command.stdin, Some(vec![7, 8]));
    }
}
