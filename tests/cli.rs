use assert_cmd::Command;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

fn config_path(dir: &TempDir) -> PathBuf {
    dir.path().join("config.toml")
}

fn nosdump(config: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("nosdump").unwrap();
    cmd.env("NOSDUMP_CONFIG", config).env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).unwrap()
}

#[test]
fn dry_run_prints_resolved_params() {
    let dir = TempDir::new().unwrap();
    let config = config_path(&dir);

    let out = stdout_of(
        nosdump(&config)
            .args([
                "-n",
                "--kinds",
                "1,7",
                "-p",
                "a".repeat(64).as_str(),
                "--until",
                "1700000000",
                "wss://relay.example.com",
            ])
            .write_stdin(r##"["REQ","sub",{"kinds":[3],"#t":["nostr"],"since":1600000000}]"##)
            .arg("-R"),
    );

    let (header, body) = out.split_once('\n').unwrap();
    assert_eq!(header, "Parsed options:");
    let params: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(
        params,
        serde_json::json!({
            "relayUrls": ["wss://relay.example.com/"],
            "fetchFilter": {
                "kinds": [1, 7],
                "#p": ["a".repeat(64)],
                "#t": ["nostr"],
            },
            "fetchTimeRange": {"since": 1600000000u64, "until": 1700000000u64},
            "fetchOptions": {"skipVerification": false},
        })
    );
}

#[test]
fn input_errors_are_reported_with_header() {
    let dir = TempDir::new().unwrap();
    let config = config_path(&dir);

    let assert = nosdump(&config)
        .args(["-n", "--authors", "bogus", "--since", "yesterday", "wss://r.example.com"])
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    let mut lines = stderr.lines();
    assert_eq!(lines.next(), Some("failed to parse options:"));
    assert_eq!(lines.filter(|l| l.starts_with("  * ")).count(), 2);

    let assert = nosdump(&config)
        .args(["-n", "wss://r.example.com"])
        .write_stdin("{\"kinds\":")
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.starts_with("failed to parse stdin as filter:\n  * invalid JSON"));

    let assert = nosdump(&config)
        .args(["-n", "nowhere"])
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.starts_with("failed to resolve relay specifiers:"));
}

#[test]
fn malformed_kinds_rejected_at_parse_time() {
    let dir = TempDir::new().unwrap();
    nosdump(&config_path(&dir))
        .args(["-n", "--kinds", "11a", "wss://r.example.com"])
        .assert()
        .failure();
}

#[test]
fn alias_subcommands_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config_path(&dir);

    nosdump(&config)
        .args(["alias", "set", "foo", "wss://foo.example.com"])
        .assert()
        .success();
    nosdump(&config)
        .args(["relay-alias", "bar", "wss://bar.example.com"])
        .assert()
        .success();

    assert_eq!(
        stdout_of(nosdump(&config).args(["alias", "get", "foo"])),
        "wss://foo.example.com/\n"
    );
    assert_eq!(
        stdout_of(nosdump(&config).args(["alias", "ls", "--json"])),
        "{\"bar\":\"wss://bar.example.com/\",\"foo\":\"wss://foo.example.com/\"}\n"
    );

    nosdump(&config).args(["alias", "rm", "foo"]).assert().success();
    nosdump(&config)
        .args(["alias", "get", "foo"])
        .assert()
        .failure();

    nosdump(&config)
        .args(["alias", "set", "bad alias", "wss://x.example.com"])
        .assert()
        .failure();
    nosdump(&config)
        .args(["alias", "set", "baz", "https://x.example.com"])
        .assert()
        .failure();
}

#[test]
fn relay_set_expands_in_dump() {
    let dir = TempDir::new().unwrap();
    let config = config_path(&dir);

    nosdump(&config)
        .args(["alias", "foo", "wss://foo.example.com"])
        .assert()
        .success();
    nosdump(&config)
        .args(["set", "add", "mine", "foo", "wss://a.example.com"])
        .assert()
        .success();
    nosdump(&config)
        .args(["set", "cp", "mine", "yours"])
        .assert()
        .success();

    assert_eq!(
        stdout_of(nosdump(&config).args(["set", "ls", "yours"])),
        "wss://foo.example.com/\nwss://a.example.com/\n"
    );

    let out = stdout_of(nosdump(&config).args(["-n", "wss://b.example.com", "...mine", "foo"]));
    let body = out.strip_prefix("Parsed options:\n").unwrap();
    let params: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(
        params["relayUrls"],
        serde_json::json!([
            "wss://b.example.com/",
            "wss://foo.example.com/",
            "wss://a.example.com/"
        ])
    );

    nosdump(&config)
        .args(["-n", "...unknown"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_config_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = config_path(&dir);
    fs::write(&config, "[relay.sets]\n\"bad name\" = [\"ftp://x.example.com\"]\n").unwrap();

    let assert = nosdump(&config)
        .args(["-n", "wss://r.example.com"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("Config file validation error!"));
    assert!(stderr.contains(config.to_str().unwrap()));
}
