fn main() -> anyhow::Result<()> {
    yomu_server::cli::run_cli()
}
