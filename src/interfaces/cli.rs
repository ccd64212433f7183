use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sukl")]
#[command(about = "Look up medicines, prices and pharmacies in the SÚKL registry.")]
#[command(version)]
pub struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Search medicines by name, substance or ATC code
    Search {
        /// Query text
        #[arg(num_args = 1.., required = true)]
        query: Vec<String>,

        /// Only medicines currently supplied
        #[arg(short = 'a', long)]
        available: bool,

        /// Only reimbursed medicines
        #[arg(short = 'r', long)]
        reimbursed: bool,

        #[arg(short = 'l', long, default_value_t = 10)]
        limit: usize,
    },

    /// Show one medicine by its SÚKL code
    Detail { code: String },

    /// Check supply status and list alternatives
    Availability { code: String },

    /// Show prices and reimbursement
    Reimbursement { code: String },

    /// Find pharmacies
    Pharmacies {
        #[arg(short = 'c', long)]
        city: Option<String>,

        #[arg(short = 'p', long)]
        postal_code: Option<String>,

        /// Open around the clock
        #[arg(long)]
        nonstop: bool,

        /// Sells online
        #[arg(long)]
        online: bool,

        #[arg(short = 'l', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show an ATC group and its subgroups
    Atc { code: String },

    /// Check the remote service, dataset and cache
    Health,

    /// Manage configuration
    Config {
        /// Generate config sample
        #[arg(long)]
        generate: bool,
    },
}
