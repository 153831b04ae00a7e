use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cfg = keyward::config::Config::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(keyward::run(cfg))
}
