#![deny(warnings)]
use clap::{App, Arg};
use local_predict::{local_predict, read_instances, DEFAULT_SERVING_SIGNATURE_DEF_KEY};
use prediction::{ModelRegistry, PredictionError, Result, Value};
use std::{
    fs::File,
    io::{self, BufReader},
    process,
};

fn read_input(path: &str) -> Result<Vec<Value>> {
    if path == "-" {
        let stdin = io::stdin();
        read_instances(stdin.lock())
    } else {
        let file = File::open(path).map_err(|e| {
            PredictionError::invalid_inputs(format!("Could not open {}: {}", path, e))
        })?;
        read_instances(BufReader::new(file))
    }
}

fn main() {
    let matches = App::new("Local Predict")
        .about("Run a prediction request against a model directory and print the predictions")
        .arg(
            Arg::with_name("model_dir")
                .short("m")
                .long("model-dir")
                .help("Directory holding the model.json manifest")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("signature_name")
                .short("s")
                .long("signature-name")
                .help("Key of the signature to serve")
                .default_value(DEFAULT_SERVING_SIGNATURE_DEF_KEY)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("json_instances")
                .short("i")
                .long("json-instances")
                .help("File with one JSON instance per line, - for stdin")
                .default_value("-")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("stats")
                .long("stats")
                .help("Print the request timings to stderr"),
        )
        .get_matches();

    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_micros().init();

    let model_dir = matches.value_of("model_dir").unwrap_or_default();
    let signature_name = matches
        .value_of("signature_name")
        .unwrap_or(DEFAULT_SERVING_SIGNATURE_DEF_KEY);
    let input = matches.value_of("json_instances").unwrap_or("-");

    let registry = ModelRegistry::new();
    let response = read_input(input).and_then(|instances| {
        local_predict(model_dir, signature_name, Value::List(instances), &registry)
    });
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if matches.is_present("stats") {
        match serde_json::to_string(&response.stats) {
            Ok(stats) => eprintln!("{}", stats),
            Err(e) => log::warn!("Could not serialize stats: {}", e),
        }
    }
    match serde_json::to_string(&response) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("{}", PredictionError::invalid_outputs(e.to_string()));
            process::exit(1);
        }
    }
}
