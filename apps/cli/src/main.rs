use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use kurumi_core_sdk::prelude::*;
use kurumi_core_sdk::{server, telemetry};

/** \brief 请求失败时展示给用户的兜底文案。 */
const FALLBACK_REPLY: &str = "……（时间仿佛停滞了一瞬，没有回应。请稍后再试。）";

/**
 * \brief CLI 程序入口：终端对话、站点上传与本地服务。
 */
#[derive(Parser, Debug)]
#[command(name = "kurumi", version, about = "Kurumi talk relay")]
struct Cli {
    /** \brief 配置文件路径，缺省读取当前目录下的 kurumi.toml */
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 交互式对话，历史保存在本进程内存中。
     */
    Talk {
        #[arg(long, default_value = "kurumi")]
        persona: String,
    },

    /**
     * \brief 单轮提问，不带历史。
     */
    Ask {
        #[arg(long, default_value = "kurumi")]
        persona: String,
        #[arg(long)]
        prompt: String,
    },

    /**
     * \brief 批量上传图片到图片墙。
     */
    UploadImages {
        #[arg(long)]
        nickname: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /**
     * \brief 上传 TXT 文件到书架。
     */
    UploadBook {
        #[arg(long)]
        uploader: String,
        #[arg(long)]
        role: Option<String>,
        file: PathBuf,
    },

    /** \brief 分页查看图片墙。 */
    Images {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /** \brief 分页查看书架。 */
    Books {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /**
     * \brief 启动本地 HTTP 服务并提供前端页面。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("load config failed")?;
    telemetry::configure(&config.telemetry);

    match cli.command {
        Commands::Talk { persona } => {
            let persona = resolve_persona(&persona)?;
            let relay = ChatRelay::new(config.relay).context("create relay failed")?;
            talk_loop(&relay, &persona).await?;
        }
        Commands::Ask { persona, prompt } => {
            let persona = resolve_persona(&persona)?;
            let relay = ChatRelay::new(config.relay).context("create relay failed")?;
            match relay.relay(&persona, &prompt, &[]).await {
                Ok(reply) => println!("{}", reply),
                Err(e) => {
                    eprintln!("relay failed: {}", e);
                    println!("{}", FALLBACK_REPLY);
                }
            }
        }
        Commands::UploadImages { nickname, files } => {
            let site = SiteClient::new(config.site).context("create site client failed")?;
            let files = files
                .iter()
                .map(|p| {
                    UploadFile::from_path(p).with_context(|| format!("read {} failed", p.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let resp = site
                .upload_images(files, &nickname)
                .await
                .context("upload images failed")?;
            println!("{}", serde_json_pretty(&resp));
        }
        Commands::UploadBook {
            uploader,
            role,
            file,
        } => {
            let site = SiteClient::new(config.site).context("create site client failed")?;
            let upload = UploadFile::from_path(&file)
                .with_context(|| format!("read {} failed", file.display()))?;
            let resp = site
                .upload_txt_file(upload, &uploader, role.as_deref())
                .await
                .context("upload book failed")?;
            println!("{}", serde_json_pretty(&resp));
        }
        Commands::Images { page, limit } => {
            let site = SiteClient::new(config.site).context("create site client failed")?;
            let resp = site
                .list_images(page, limit)
                .await
                .context("list images failed")?;
            println!("{}", serde_json_pretty(&resp));
        }
        Commands::Books { page, limit } => {
            let site = SiteClient::new(config.site).context("create site client failed")?;
            let resp = site
                .list_txt_files(page, limit)
                .await
                .context("list books failed")?;
            println!("{}", serde_json_pretty(&resp));
        }
        Commands::Serve { addr } => {
            server::run(&addr, config).await?;
        }
    }

    Ok(())
}

fn resolve_persona(key: &str) -> Result<PersonaProfile> {
    PersonaProfile::by_key(key).with_context(|| {
        let known: Vec<String> = PersonaProfile::builtin().into_iter().map(|p| p.key).collect();
        format!("unknown persona {}, expected one of: {}", key, known.join(", "))
    })
}

/**
 * \brief 终端对话循环。只有拿到回复后才把本轮输入与回复追加进历史。
 */
async fn talk_loop(relay: &ChatRelay, persona: &PersonaProfile) -> Result<()> {
    let mut history: Vec<Message> = Vec::new();
    let mut next_id: i64 = 1;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("与 {} 对话中，输入 /reset 清空历史，/exit 退出。", persona.name);
    loop {
        stdout.write_all("> ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/exit" => break,
            "/reset" => {
                history.clear();
                println!("（历史已清空）");
                continue;
            }
            _ => {}
        }

        match relay.relay(persona, &line, &history).await {
            Ok(reply) => {
                println!("{}: {}", persona.name, reply);
                history.push(Message::user(next_id, line));
                history.push(Message::assistant(next_id + 1, reply));
                next_id += 2;
            }
            Err(e) => {
                eprintln!("relay failed: {}", e);
                println!("{}: {}", persona.name, FALLBACK_REPLY);
            }
        }
    }
    Ok(())
}

fn serde_json_pretty(v: &serde_json::Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}
