use clap::Parser;
use proving_ground::ProvingGroundCli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = ProvingGroundCli::parse();
    let report = proving_ground::execute(cli)?;

    println!("{}", report.display());

    Ok(())
}
