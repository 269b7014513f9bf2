//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::io::AsyncWriteExt as _;

use crate::{
    async_utils::io::create_writer,
    config::Config,
    detection::Detections,
    documents::{DocumentInput, DocumentOutput},
    prelude::*,
    work::{WorkInput, WorkOutput},
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// One record of `map` input.
    DocumentInput,
    /// One record of `map` output.
    DocumentOutput,
    /// A detections file.
    Detections,
    /// A mapping configuration file.
    Config,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    // Get our schema.
    let schema = match schema_opts.schema_type {
        SchemaType::DocumentInput => schema_for!(WorkInput<DocumentInput>),
        SchemaType::DocumentOutput => schema_for!(WorkOutput<DocumentOutput>),
        SchemaType::Detections => schema_for!(Detections),
        SchemaType::Config => schema_for!(Config),
    };

    // Write out our schema.
    let mut wtr = create_writer(schema_opts.output_path.as_deref()).await?;
    let schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    wtr.write_all(schema_str.as_bytes())
        .await
        .context("failed to write schema")?;
    wtr.flush().await.context("failed to flush schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_config_schema() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("config.schema.json");
        cmd_schema(&SchemaOpts {
            schema_type: SchemaType::Config,
            output_path: Some(path.clone()),
        })
        .await?;

        let schema = serde_json::from_str::<Value>(&tokio::fs::read_to_string(&path).await?)?;
        assert_eq!(schema["title"], "Config");
        assert!(schema["properties"]["box_mapping"].is_object());
        Ok(())
    }
}
