//! GUI drive session
//!
//! Drives a running engine GUI over a queue. The GUI reports its progress as
//! plain lines; the session tracks them so callers can wait for a project or
//! model to become ready before issuing commands.
//!
//! # Notifications
//!
//! | Line | Effect |
//! |------|--------|
//! | `project_init <path>` | remembers the project path |
//! | `project_loaded` | project is loaded |
//! | `model_init` | model is initialised |
//! | `model_unloaded` | model is no longer initialised |
//!
//! Any other line is only remembered as the last message.

use super::QueueClient;
use crate::engine::wire;
use crate::error::Result;
use crate::types::VariableMap;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

/// State reported by the GUI so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuiState {
    pub project_path: String,
    pub project_loaded: bool,
    pub model_initialized: bool,
    pub last_message: String,
    /// The GUI closed its end of the queue
    pub closed: bool,
}

impl GuiState {
    /// Fold one notification line into the state
    pub fn apply(&mut self, line: &str) {
        self.last_message = line.to_string();
        if let Some(path) = line.strip_prefix("project_init ") {
            self.project_path = path.to_string();
        } else {
            match line {
                "project_loaded" => self.project_loaded = true,
                "model_init" => self.model_initialized = true,
                "model_unloaded" => self.model_initialized = false,
                _ => {}
            }
        }
    }
}

/// Command/notification session with an engine GUI
#[derive(Debug)]
pub struct GuiSession {
    client: QueueClient,
    state: GuiState,
}

impl GuiSession {
    pub fn new(client: QueueClient) -> Self {
        Self {
            client,
            state: GuiState::default(),
        }
    }

    pub fn state(&self) -> &GuiState {
        &self.state
    }

    pub fn key(&self) -> &str {
        self.client.key()
    }

    /// Consume at most one pending notification; returns whether a line
    /// was processed
    pub fn communicate(&mut self) -> bool {
        let line = self.client.read(false);
        if line == wire::CLOSED {
            self.state.last_message = line;
            self.state.closed = true;
            return false;
        }
        if line.is_empty() {
            return false;
        }

        tracing::debug!("GUI: {}", line);
        self.state.apply(&line);
        true
    }

    /// Process notifications until `done` holds, sleeping `poll` whenever
    /// nothing is pending
    ///
    /// Returns `false` if the GUI closed the queue first.
    pub fn wait_for<F>(&mut self, mut done: F, poll: Duration) -> bool
    where
        F: FnMut(&GuiState) -> bool,
    {
        while !done(&self.state) {
            if self.state.closed {
                return false;
            }
            if !self.communicate() {
                thread::sleep(poll);
            }
        }
        true
    }

    /// Set one engine variable
    pub fn set_variable(&self, variable: &str, value: impl Display) -> Result<()> {
        self.send(&format!("core_cmd set {} {};", variable, value))
    }

    /// Set several engine variables in one message, one command per line
    pub fn set_variables(&self, values: &VariableMap) -> Result<()> {
        let text: String = values
            .iter()
            .map(|(name, value)| format!("core_cmd set {} {};\n", name, value))
            .collect();
        self.send(&text)
    }

    /// Register a command to run when the simulation starts
    pub fn onstart(&self, command: &str) -> Result<()> {
        self.send(&format!("onstart {};", command))
    }

    /// Press a button on a tab, optionally with a parameter
    pub fn push_button(&self, tab: &str, button: &str, param: Option<&str>) -> Result<()> {
        match param.filter(|p| !p.is_empty()) {
            Some(param) => self.send(&format!("button {} {} {}", tab, button, param)),
            None => self.send(&format!("button {} {}", tab, button)),
        }
    }

    /// Switch the main tab
    pub fn select_maintab(&self, tab: &str) -> Result<()> {
        self.send(&format!("maintab {}", tab))
    }

    /// Run a core command
    pub fn core_command(&self, command: &str) -> Result<()> {
        self.send(&format!("core_cmd {};", command))
    }

    pub fn close(self) {
        self.client.close();
    }

    fn send(&self, text: &str) -> Result<()> {
        self.client.send(text).into_result(self.client.key())
    }
}


#[cfg(all(test, feature = "mock-engine"))]
mod loopback_tests {
    use super::*;
    use crate::engine::LoopbackQueueEngine;
    use crate::queue::MessageQueue;
    use crate::types::Value;
    use std::sync::Arc;

    fn session(engine: &Arc<LoopbackQueueEngine>) -> GuiSession {
        let queue = MessageQueue::new(engine.clone(), "Rust");
        GuiSession::new(queue.create_specific("gui").unwrap())
    }

    #[test]
    fn test_communicate_idle_and_closed() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let mut gui = session(&engine);
        assert!(!gui.communicate());

        engine.hang_up("gui");
        assert!(!gui.communicate());
        assert!(gui.state().closed);
        assert_eq!(gui.state().last_message, "CLOSED");
    }

    #[test]
    fn test_wait_for_model() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let mut gui = session(&engine);
        for line in ["project_init plant.sumo", "project_loaded", "model_init"] {
            engine.inject("gui", line);
        }

        assert!(gui.wait_for(|s| s.model_initialized, Duration::from_millis(1)));
        assert_eq!(gui.state().project_path, "plant.sumo");
    }

    #[test]
    fn test_wait_for_gives_up_on_close() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let mut gui = session(&engine);
        engine.hang_up("gui");
        assert!(!gui.wait_for(|s| s.model_initialized, Duration::from_millis(1)));
    }

    #[test]
    fn test_command_spelling() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let gui = session(&engine);

        gui.set_variable("Sumo__StopTime", 3600000).unwrap();
        let mut values = VariableMap::new();
        values.insert("a".to_string(), Value::Int(1));
        values.insert("b".to_string(), Value::Float(2.5));
        gui.set_variables(&values).unwrap();
        gui.onstart("maptoic").unwrap();
        gui.push_button("Simulate", "Start", None).unwrap();
        gui.push_button("Simulate", "Speed", Some("max")).unwrap();
        gui.select_maintab("Simulate").unwrap();
        gui.core_command("save state.xml").unwrap();

        assert_eq!(
            engine.sent("gui"),
            vec![
                "core_cmd set Sumo__StopTime 3600000;",
                "core_cmd set a 1;\ncore_cmd set b 2.5;\n",
                "onstart maptoic;",
                "button Simulate Start",
                "button Simulate Speed max",
                "maintab Simulate",
                "core_cmd save state.xml;",
            ]
        );

        gui.close();
        assert!(engine.is_closed("gui"));
    }
}
