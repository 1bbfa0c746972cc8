use clap::Parser;
use cngexport_config::{AppConfigLayer, BlobFormat, ExportConfigLayer};
use std::path::PathBuf;

/// List the machine's CNG keys, or export one of them to `<KEY_NAME>.pem`.
#[derive(Parser, Debug)]
#[command(name = "cngexport", version, about = "List or export machine CNG keys")]
pub struct Cli {
    /// Key to export. Without it, key names are listed.
    #[arg(value_name = "KEY_NAME")]
    pub names: Vec<String>,

    /// Print the algorithm next to each listed key.
    #[arg(long, short = 'l')]
    pub long: bool,

    /// Config file read instead of the per-user one.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory the `.pem` file is written to.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Blob format: pkcs8, legacy-rsa or bcrypt.
    #[arg(long)]
    pub format: Option<BlobFormat>,

    /// Refuse keys that are not exportable instead of forcing them.
    #[arg(long)]
    pub no_override: bool,
}

impl Cli {
    /// Settings given on the command line, applied over every config file.
    pub fn overrides(&self) -> AppConfigLayer {
        let export = ExportConfigLayer {
            output_dir: self.out_dir.clone(),
            format: self.format,
            override_policy: self.no_override.then_some(false),
            overwrite: None,
        };
        AppConfigLayer {
            export: Some(export),
            ..Default::default()
        }
    }
}
