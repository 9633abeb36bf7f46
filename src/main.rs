//! Stackvo Agent - 本地开发环境管理代理
//!
//! Usage:
//! - Normal mode: `stackvo-agent`
//! - With custom port: `stackvo-agent --port 3100`

use stackvo_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                if config.port_override.is_none() {
                    eprintln!("Ignoring invalid port: {}", args[i + 1]);
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Stackvo Agent - 本地开发环境管理代理");
    println!();
    println!("USAGE:");
    println!("    stackvo-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port (default 3000, or $PORT)");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    STACKVO_BASE_DIR      Installation root (default /app or the current directory)");
    println!("    STACKVO_ENV_FILE      Flat key=value configuration (default <base>/.env)");
    println!("    STACKVO_CONFIG_FILE   Optional JSON application config");
    println!("    RUST_LOG              Log filter (default info)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = parse_args();
    stackvo_agent::init_and_run_agent_with_config(config).await
}
