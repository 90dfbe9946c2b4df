use anyhow::Result;
use todoball::model::ProcessRole;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let role = ProcessRole::from_args(std::env::args());
    todoball::run(role)
}
