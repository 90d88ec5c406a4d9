use std::path::{Path, PathBuf};

use clap::Args;

use heliostat::{emit, Error, QuantizedModel};

#[derive(Args)]
pub struct InspectArgs {
    /// Model binary, or a C header embedding one (.h)
    pub input: PathBuf,
}

fn read_model_bytes(path: &Path) -> heliostat::Result<Vec<u8>> {
    if path.extension().is_some_and(|e| e == "h") {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        emit::parse_header(&text)
    } else {
        std::fs::read(path).map_err(|e| Error::io(path, e))
    }
}

pub fn cmd_inspect(args: InspectArgs) {
    let bytes = read_model_bytes(&args.input).unwrap_or_else(|e| super::fail(e));
    let model = QuantizedModel::from_bytes(&bytes)
        .map_err(Error::from)
        .unwrap_or_else(|e| super::fail(e));

    println!(
        "{}: {} bytes, blake3 {}",
        args.input.display(),
        bytes.len(),
        blake3::hash(&bytes).to_hex()
    );
    println!("  input   {}", model.input);
    println!("  output  {}", model.output);
    for (i, layer) in model.layers.iter().enumerate() {
        let (wmin, wmax) = layer
            .weights
            .iter()
            .fold((i8::MAX, i8::MIN), |(lo, hi), &w| (lo.min(w), hi.max(w)));
        println!(
            "  layer {i}: {} -> {} {}, weights [{wmin}, {wmax}], accum {}",
            layer.in_dim, layer.out_dim, layer.activation, layer.accum
        );
    }
}
