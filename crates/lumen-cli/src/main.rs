use std::{env, path::Path, process::ExitCode};

use lumen::compile_file;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} [SOURCE]", args.first().map_or("lumen", String::as_str));
        return ExitCode::FAILURE;
    }

    match compile_file(Path::new(&args[1])) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Diagnostics go to stdout as `path:row:col: message`.
            println!("{error}");
            ExitCode::FAILURE
        }
    }
}
