mod cli;
mod html;
mod vision;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    vision::init_telemetry();
    let config = cli::parse_config()?;
    vision::run(config)
}
