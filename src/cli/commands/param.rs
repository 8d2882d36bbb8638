//! `umpire param` subcommands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{or_dash, output, table, CommandOutput};
use crate::domain::models::{Component, Directory, ParameterDocument};
use crate::services::ComponentUpdate;

#[derive(Subcommand, Debug)]
pub enum ParamCommands {
    /// Create a directory, or rename one with --dir-id
    Dir {
        /// Directory name
        #[arg(short, long)]
        name: String,

        /// Directory to rename
        #[arg(long)]
        dir_id: Option<usize>,

        /// Parent of a new directory (root when omitted)
        #[arg(long)]
        parent_id: Option<usize>,
    },

    /// Create a component, add a version, roll back or rename
    Component {
        /// Existing component to update
        #[arg(long)]
        comp_id: Option<usize>,

        /// Directory of a new component (root when omitted)
        #[arg(long)]
        dir_id: Option<usize>,

        /// Name of a new component, or new name of an existing one
        #[arg(short, long)]
        name: Option<String>,

        /// Revision to switch to
        #[arg(long)]
        using_ver: Option<usize>,

        /// File to add as a new revision
        #[arg(long)]
        src: Option<PathBuf>,
    },

    /// List components of a namespace (slash-separated directory path)
    Query {
        #[arg(long)]
        namespace: Option<String>,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Dump the parameter tree
    Info,
}

#[derive(Debug, Serialize)]
struct DirectoryOutput(Directory);

impl CommandOutput for DirectoryOutput {
    fn to_human(&self) -> String {
        format!(
            "Directory {} {:?} (parent: {})",
            self.0.id,
            self.0.name,
            or_dash(self.0.parent_id)
        )
    }
}

#[derive(Debug, Serialize)]
struct ComponentOutput(Component);

impl CommandOutput for ComponentOutput {
    fn to_human(&self) -> String {
        format!(
            "Component {} {:?} (dir: {}) using version {} of {}\n  {}",
            self.0.id,
            self.0.name,
            or_dash(self.0.dir_id),
            self.0.using_ver,
            self.0.revisions.len(),
            self.0.current_path()
        )
    }
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    namespace: Option<String>,
    parameters: Vec<QueryEntry>,
}

#[derive(Debug, Serialize)]
struct QueryEntry {
    name: String,
    path: PathBuf,
}

impl CommandOutput for QueryOutput {
    fn to_human(&self) -> String {
        if self.parameters.is_empty() {
            return "No parameters found.".to_string();
        }
        table(
            &["Name", "Path"],
            self.parameters
                .iter()
                .map(|p| vec![p.name.clone(), p.path.display().to_string()]),
        )
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput(ParameterDocument);

impl CommandOutput for InfoOutput {
    fn to_human(&self) -> String {
        let dirs = table(
            &["Dir", "Parent", "Name"],
            self.0.dirs.iter().map(|d| {
                vec![d.id.to_string(), or_dash(d.parent_id), d.name.clone()]
            }),
        );
        let files = table(
            &["Comp", "Dir", "Name", "Using", "Revisions"],
            self.0.files.iter().map(|f| {
                vec![
                    f.id.to_string(),
                    or_dash(f.dir_id),
                    f.name.clone(),
                    f.using_ver.to_string(),
                    f.revisions.len().to_string(),
                ]
            }),
        );
        format!("Directories:\n{dirs}\n\nComponents:\n{files}")
    }
}

pub async fn execute(command: ParamCommands, ctx: &CommandContext) -> Result<()> {
    let (_, commands) = ctx.open_commands()?;
    match command {
        ParamCommands::Dir {
            name,
            dir_id,
            parent_id,
        } => {
            let dir = commands
                .update_parameter_directory(dir_id, parent_id, &name)
                .await
                .context("Failed to update parameter directory")?;
            output(&DirectoryOutput(dir), ctx.json);
        }
        ParamCommands::Component {
            comp_id,
            dir_id,
            name,
            using_ver,
            src,
        } => {
            let update = ComponentUpdate {
                comp_id,
                dir_id,
                name,
                using_ver,
                src_path: src,
            };
            let component = commands
                .update_parameter_component(update)
                .await
                .context("Failed to update parameter component")?;
            output(&ComponentOutput(component), ctx.json);
        }
        ParamCommands::Query { namespace, name } => {
            let parameters = commands
                .query_parameters(namespace.as_deref(), name.as_deref())
                .await
                .into_iter()
                .map(|(name, path)| QueryEntry { name, path })
                .collect();
            output(
                &QueryOutput {
                    namespace,
                    parameters,
                },
                ctx.json,
            );
        }
        ParamCommands::Info => {
            output(&InfoOutput(commands.get_parameter_info().await), ctx.json);
        }
    }
    Ok(())
}
