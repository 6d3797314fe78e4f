//! matbridge 命令行：启动 worker，执行一次工具调用并以 JSON 打印结果
//!
//! 用法：
//!   matbridge search FORMULA
//!   matbridge select MP_ID
//!   matbridge export URI [poscar|cif]
//!   matbridge supercell URI N
//!   matbridge moire URI SPACING [TWIST_DEG]
//!   matbridge tools
//!
//! 配置文件可通过 MATBRIDGE_CONFIG 指定，其余同 config/default.toml 与 MATBRIDGE__* 环境变量。

use std::path::PathBuf;

use anyhow::{bail, Context};
use matbridge::client::{MatClient, MoireOptions, ScalingSpec, StructureFormat};
use matbridge::config::{load_config, AppConfig};
use serde_json::{json, Value};

const USAGE: &str = "usage: matbridge <search FORMULA | select MP_ID | export URI [poscar|cif] | \
                     supercell URI N | moire URI SPACING [TWIST_DEG] | tools>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    matbridge::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        bail!(USAGE);
    };

    let cfg = load_config(std::env::var_os("MATBRIDGE_CONFIG").map(PathBuf::from)).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let mut client = MatClient::from_config(&cfg);
    let result = run(&mut client, command, &args[1..]).await;
    client.shutdown().await;

    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value).context("Failed to encode result")?);
    Ok(())
}

async fn run(client: &mut MatClient, command: &str, rest: &[String]) -> anyhow::Result<Value> {
    let value = match command {
        "search" => {
            let materials = client.search_materials(arg(rest, 0, "FORMULA")?).await?;
            serde_json::to_value(materials)?
        }
        "select" => serde_json::to_value(client.select_material(arg(rest, 0, "MP_ID")?).await?)?,
        "export" => {
            let format = match rest.get(1).map(String::as_str) {
                None | Some("poscar") => StructureFormat::Poscar,
                Some("cif") => StructureFormat::Cif,
                Some(other) => bail!("unknown format '{other}' (expected poscar or cif)"),
            };
            serde_json::to_value(client.get_structure_data(arg(rest, 0, "URI")?, format).await?)?
        }
        "supercell" => {
            let n: i64 = arg(rest, 1, "N")?.parse().context("N must be an integer")?;
            serde_json::to_value(client.build_supercell(arg(rest, 0, "URI")?, ScalingSpec::Uniform(n)).await?)?
        }
        "moire" => {
            let spacing: f64 = arg(rest, 1, "SPACING")?.parse().context("SPACING must be a number")?;
            let mut options = MoireOptions::new(spacing);
            if let Some(twist) = rest.get(2) {
                options = options.twist_angle(twist.parse().context("TWIST_DEG must be a number")?);
            }
            serde_json::to_value(client.moire_homobilayer(arg(rest, 0, "URI")?, &options).await?)?
        }
        "tools" => {
            let tools = client.list_tools().await?;
            json!({ "tools": tools })
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    };
    Ok(value)
}

fn arg<'a>(rest: &'a [String], index: usize, name: &str) -> anyhow::Result<&'a str> {
    rest.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing {name}\n{USAGE}"))
}
