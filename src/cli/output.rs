//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ShardexArgs};
use crate::error::Result;
use crate::summary::IndexSummary;
use crate::verify::VerifyReport;

/// Results that have a human-readable rendering.
pub trait HumanOutput {
    fn to_human(&self) -> String;
}

impl HumanOutput for IndexSummary {
    fn to_human(&self) -> String {
        let mut text = self.to_text();
        for shard in &self.shards {
            let _ = writeln!(
                text,
                "  {:<24} {:>12} postings {:>14} bytes",
                shard.file_name, shard.record_count, shard.byte_size
            );
        }
        text
    }
}

impl HumanOutput for VerifyReport {
    fn to_human(&self) -> String {
        format!(
            "Shards   : {}\nPostings : {}\nTerms    : {}\n",
            self.shard_count, self.record_count, self.term_count
        )
    }
}

/// Print a command result in the selected format.
pub fn output_result<T>(message: &str, result: &T, args: &ShardexArgs) -> Result<()>
where
    T: Serialize + HumanOutput,
{
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
                println!();
            }
            print!("{}", result.to_human());
        }
        OutputFormat::Json => println!("{}", to_json(result, args.pretty)?),
    }
    Ok(())
}

fn to_json<T: Serialize>(result: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    Ok(json)
}
