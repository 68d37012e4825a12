use dotenvy::dotenv;
use log::info;
use mpg_server::{
    cli::{handle_command_line_args, Command},
    config::ServerConfig,
    jobs::run_job_by_name,
    server::run_server,
};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let command = handle_command_line_args();
    let config = ServerConfig::from_env_or_default();
    match command {
        Command::Help => {},
        Command::RunJob(name) => match run_job_by_name(&config, &name).await {
            Ok(summary) => println!("{name}: {summary}"),
            Err(e) => {
                eprintln!("{name} failed. {e}");
                std::process::exit(1);
            },
        },
        Command::Serve => {
            info!("🚀️ Starting server on {}:{}", config.host, config.port);
            match run_server(config).await {
                Ok(_) => println!("Bye!"),
                Err(e) => eprintln!("{e}"),
            }
        },
    }
}
