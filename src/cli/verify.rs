use std::path::PathBuf;

use clap::Args;

use heliostat::emit;

#[derive(Args)]
pub struct VerifyArgs {
    /// Generated C header
    pub header: PathBuf,
    /// Model binary it should embed
    pub binary: PathBuf,
}

pub fn cmd_verify(args: VerifyArgs) {
    match emit::verify(&args.header, &args.binary) {
        Ok(len) => println!(
            "[OK] {} embeds {} ({len} bytes)",
            args.header.display(),
            args.binary.display()
        ),
        Err(e) => super::fail(e),
    }
}
