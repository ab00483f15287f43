//! Pandoc command-line construction.

use std::path::Path;

use pb_core::formats;
use pb_core::{ConversionOptions, ResolvedFormats, WrapMode};

/// Build the Pandoc argument list for one conversion.
///
/// Leading tool arguments from configuration are not included.
pub fn build_args(
    formats: &ResolvedFormats,
    options: &ConversionOptions,
    input: &Path,
    output: &Path,
) -> Vec<String> {
    let mut args = vec!["-f".to_string(), formats.source.clone()];
    args.extend(formats::writer_args(&formats.target));

    if options.standalone {
        args.push("--standalone".into());
    }
    if options.table_of_contents {
        args.push("--toc".into());
    }
    if options.number_sections {
        args.push("--number-sections".into());
    }
    if options.wrap != WrapMode::Auto {
        args.push("--wrap".into());
        args.push(options.wrap.as_str().into());
    }
    args.push("--columns".into());
    args.push(options.columns.to_string());
    if let Some(engine) = &options.pdf_engine {
        args.push("--pdf-engine".into());
        args.push(engine.clone());
    }

    args.push(input.to_string_lossy().into_owned());
    args.push("-o".into());
    args.push(output.to_string_lossy().into_owned());
    args
}
