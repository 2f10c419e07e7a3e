fn main() -> anyhow::Result<()> {
    dtc_genotypes::cli::run()
}
