use std::process::Command;

use eyre::Context as _;
use serde_json::Value;

struct Dirs {
    cfg: tempfile::TempDir,
    data: tempfile::TempDir,
}

impl Dirs {
    fn new() -> eyre::Result<Self> {
        Ok(Self {
            cfg: tempfile::tempdir()?,
            data: tempfile::tempdir()?,
        })
    }

    fn run(&self, args: &[&str]) -> eyre::Result<(bool, Value)> {
        let exe = assert_cmd::cargo::cargo_bin!("swapguard");
        let out = Command::new(exe)
            .env("SWAPGUARD_CONFIG_DIR", self.cfg.path())
            .env("SWAPGUARD_DATA_DIR", self.data.path())
            .env_remove("SWAPGUARD_PRIVATE_KEY")
            .env_remove("SWAPGUARD_INDEX_API_KEY")
            .args(args)
            .output()
            .with_context(|| format!("run swapguard {args:?}"))?;
        let v: Value = serde_json::from_slice(&out.stdout).with_context(|| {
            format!(
                "parse json from {args:?}; stderr={}",
                String::from_utf8_lossy(&out.stderr)
            )
        })?;
        Ok((out.status.success(), v))
    }
}

#[test]
fn paths_honor_env_overrides() -> eyre::Result<()> {
    let d = Dirs::new()?;
    let (ok, v) = d.run(&["paths"])?;
    assert!(ok, "paths exits zero");
    let log = v.get("log_file").and_then(Value::as_str).unwrap_or_default();
    assert!(log.ends_with("swapguard.log.jsonl"), "log file: {log}");
    assert!(
        log.starts_with(&*d.data.path().to_string_lossy()),
        "log under data dir"
    );
    Ok(())
}

#[test]
fn tokens_lists_the_default_registry() -> eyre::Result<()> {
    let d = Dirs::new()?;
    let (ok, v) = d.run(&["tokens"])?;
    assert!(ok, "tokens exits zero");
    let symbols: Vec<&str> = v
        .as_array()
        .map(|a| a.iter().filter_map(|t| t.get("symbol")?.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(symbols, vec!["MON", "WMON", "USDC", "USDT"], "registry order");
    Ok(())
}

#[test]
fn min_out_applies_the_slippage_floor() -> eyre::Result<()> {
    let d = Dirs::new()?;
    let (ok, v) = d.run(&["min-out", "10000000000000000", "--slippage", "0.5"])?;
    assert!(ok, "min-out exits zero");
    assert_eq!(
        v.get("minimum_out").and_then(Value::as_str),
        Some("9950000000000000"),
        "0.5% below the quote"
    );
    assert_eq!(v.get("slippage_bps").and_then(Value::as_u64), Some(50), "bps");
    Ok(())
}

#[test]
fn bad_input_reports_a_coded_error() -> eyre::Result<()> {
    let d = Dirs::new()?;
    let (ok, v) = d.run(&["min-out", "12abc"])?;
    assert!(!ok, "non-zero exit");
    assert_eq!(
        v.pointer("/error/code").and_then(Value::as_str),
        Some("invalid_amount"),
        "error code"
    );
    Ok(())
}

#[test]
fn init_writes_a_loadable_config() -> eyre::Result<()> {
    let d = Dirs::new()?;
    let (ok, v) = d.run(&["init"])?;
    assert!(ok, "init exits zero");
    assert_eq!(v.get("written").and_then(Value::as_bool), Some(true), "written");

    let (_, again) = d.run(&["init"])?;
    assert_eq!(again.get("written").and_then(Value::as_bool), Some(false), "kept");

    let (ok, net) = d.run(&["network", "--offline"])?;
    assert!(ok, "config round-trips through the file");
    assert_eq!(net.get("chain_id_hex").and_then(Value::as_str), Some("0x279f"), "chain");
    Ok(())
}

#[test]
fn demo_portfolio_needs_no_api_key() -> eyre::Result<()> {
    let d = Dirs::new()?;
    let (ok, v) = d.run(&[
        "portfolio",
        "0x00000000000000000000000000000000000000aa",
        "--demo",
    ])?;
    assert!(ok, "portfolio exits zero");
    assert_eq!(
        v.pointer("/portfolio/total_tokens").and_then(Value::as_u64),
        Some(3),
        "fixture tokens"
    );
    assert_eq!(
        v.pointer("/stats/non_zero_tokens").and_then(Value::as_u64),
        Some(2),
        "zero-balance fixture excluded"
    );
    Ok(())
}

#[test]
fn unknown_subcommand_is_rejected() -> eyre::Result<()> {
    let d = Dirs::new()?;
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("swapguard"))
        .env("SWAPGUARD_CONFIG_DIR", d.cfg.path())
        .env("SWAPGUARD_DATA_DIR", d.data.path())
        .arg("teleport")
        .assert()
        .failure()
        .stderr(predicates::str::contains("unrecognized subcommand"));
    Ok(())
}
