//! Stateful session with a remote APM server
//!
//! A session is identified by its application name. Commands must follow the
//! order clear, model, data, options, solve, solution; the stage reached so
//! far is tracked and out-of-order calls are rejected before anything is
//! sent.

use std::fmt;

use tracing::{debug, info};

use crate::common::{CraneError, CraneResult, SolutionTable, Transport};
use crate::model::document::ModelDocument;
use crate::remote::data::DataTable;

/// Resource holding the solved trajectories
pub const RESULTS_RESOURCE: &str = "results.csv";

/// Progress of a session, in required order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionStage {
    Fresh,
    Cleared,
    ModelLoaded,
    DataLoaded,
    Configured,
    Solved,
}

/// Server-side classification of a model variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableClass {
    /// Fixed value
    Fv,
    /// Manipulated variable
    Mv,
    /// State variable
    Sv,
    /// Controlled variable
    Cv,
}

impl fmt::Display for VariableClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableClass::Fv => "FV",
            VariableClass::Mv => "MV",
            VariableClass::Sv => "SV",
            VariableClass::Cv => "CV",
        };
        write!(f, "{}", name)
    }
}

pub struct RemoteSession<T: Transport> {
    transport: T,
    app: String,
    stage: SessionStage,
}

impl<T: Transport> RemoteSession<T> {
    /// Open a session for `app`. The name is lowercased with whitespace
    /// removed, as the server does.
    pub fn new(transport: T, app: &str) -> CraneResult<Self> {
        let app: String = app
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let valid = !app.is_empty() && app.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(CraneError::SessionError(format!(
                "'{}' is not a valid application name",
                app
            )));
        }
        Ok(Self {
            transport,
            app,
            stage: SessionStage::Fresh,
        })
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Reset server state for this application. Valid at any stage.
    pub fn clear(&mut self) -> CraneResult<()> {
        self.send("clear all")?;
        self.stage = SessionStage::Cleared;
        Ok(())
    }

    /// Upload the whole model document in one command
    pub fn load_model(&mut self, document: &ModelDocument) -> CraneResult<()> {
        self.expect_between("load model", SessionStage::Cleared, SessionStage::ModelLoaded)?;
        info!(app = %self.app, lines = document.line_count(), "uploading model");
        self.send(&format!(" {}", document.text()))?;
        self.stage = SessionStage::ModelLoaded;
        Ok(())
    }

    /// Upload the model one line at a time, blank lines included
    pub fn load_model_lines<'a, I>(&mut self, lines: I) -> CraneResult<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.expect_between("load model", SessionStage::Cleared, SessionStage::ModelLoaded)?;
        let mut sent = 0;
        for line in lines {
            self.send(line)?;
            sent += 1;
        }
        info!(app = %self.app, lines = sent, "uploaded model line by line");
        self.stage = SessionStage::ModelLoaded;
        Ok(sent)
    }

    pub fn load_data(&mut self, data: &DataTable) -> CraneResult<()> {
        self.expect_between("load data", SessionStage::ModelLoaded, SessionStage::DataLoaded)?;
        data.validate()?;
        info!(app = %self.app, rows = data.len(), columns = data.names().count(), "uploading data");
        self.send(&format!("csv {}", data.to_csv_string()?))?;
        self.stage = SessionStage::DataLoaded;
        Ok(())
    }

    /// `option <name> = <value>`, e.g. `nlc.imode = 6`
    pub fn set_option(&mut self, name: &str, value: impl fmt::Display) -> CraneResult<()> {
        self.expect_at_least("set option", SessionStage::ModelLoaded)?;
        self.send(&format!("option {} = {}", name, value))?;
        self.stage = SessionStage::Configured;
        Ok(())
    }

    /// Classify a variable, e.g. `info MV, u`
    pub fn info(&mut self, class: VariableClass, name: &str) -> CraneResult<()> {
        self.expect_at_least("classify variable", SessionStage::ModelLoaded)?;
        self.send(&format!("info {}, {}", class, name))?;
        self.stage = SessionStage::Configured;
        Ok(())
    }

    /// Run the solver. The returned status text is for display only.
    pub fn solve(&mut self) -> CraneResult<String> {
        self.expect_at_least("solve", SessionStage::ModelLoaded)?;
        info!(app = %self.app, "solving");
        let output = self.send("solve")?;
        self.stage = SessionStage::Solved;
        Ok(output)
    }

    /// Fetch and parse the solution of the last solve
    pub fn solution(&mut self) -> CraneResult<SolutionTable> {
        self.expect_at_least("fetch solution", SessionStage::Solved)?;
        self.transport
            .fetch(&self.app, RESULTS_RESOURCE)
            .and_then(|text| SolutionTable::from_row_csv(&text))
            .map_err(|e| CraneError::SolutionUnavailable(Box::new(e)))
    }

    fn send(&mut self, command: &str) -> CraneResult<String> {
        debug!(app = %self.app, bytes = command.len(), "sending command");
        self.transport.send(&self.app, command)
    }

    fn expect_at_least(&self, action: &str, stage: SessionStage) -> CraneResult<()> {
        if self.stage < stage {
            return Err(CraneError::SessionError(format!(
                "cannot {} at stage {:?}, requires {:?}",
                action, self.stage, stage
            )));
        }
        Ok(())
    }

    fn expect_between(&self, action: &str, first: SessionStage, last: SessionStage) -> CraneResult<()> {
        if self.stage < first || self.stage > last {
            return Err(CraneError::SessionError(format!(
                "cannot {} at stage {:?}",
                action, self.stage
            )));
        }
        Ok(())
    }
}
