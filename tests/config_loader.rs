use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

use olap_report::config::{ConfigError, ConfigLoader};
use tempfile::TempDir;

const KEYS: &[&str] = &[
    "KPI_REPORT_PROFILE",
    "KPI_REPORT_LOG_LEVEL",
    "KPI_REPORT_MYSQL_HOST",
    "KPI_REPORT_MYSQL_PORT",
    "KPI_REPORT_MYSQL_PASSWORD",
    "KPI_REPORT_STORE_PATH",
    "KPI_REPORT_TABLES",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for key in KEYS {
        env::remove_var(key);
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).expect("write env file");
}

#[test]
fn loads_defaults_from_an_empty_directory() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().expect("tempdir");
    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("defaults load");

    assert_eq!(config.profile, "local");
    assert_eq!(config.source.host, "localhost");
    assert_eq!(config.source.port, 3306);
    assert_eq!(config.source.database, "dwpikp");
    assert_eq!(config.tables.len(), 8);
    assert_eq!(config.store_path, PathBuf::from("duckdb_database/dwpikp.duckdb"));
    assert_eq!(config.report_path, PathBuf::from("documentation/README.pdf"));
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().expect("tempdir");
    write_env_file(&dir, ".env", "KPI_REPORT_MYSQL_HOST=db.local\nKPI_REPORT_MYSQL_PORT=3307\n");
    write_env_file(&dir, ".env.local", "KPI_REPORT_PROFILE=test\nKPI_REPORT_MYSQL_HOST=db.override\n");
    write_env_file(&dir, ".env.test", "KPI_REPORT_MYSQL_PORT=3308\n");
    write_env_file(&dir, ".env.test.local", "KPI_REPORT_STORE_PATH=/tmp/test.duckdb\n");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("layered config loads");

    assert_eq!(config.profile, "test");
    assert_eq!(config.source.host, "db.override");
    assert_eq!(config.source.port, 3308);
    assert_eq!(config.store_path, PathBuf::from("/tmp/test.duckdb"));
}

#[test]
fn process_env_wins_over_files() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().expect("tempdir");
    write_env_file(&dir, ".env", "KPI_REPORT_LOG_LEVEL=warn\nKPI_REPORT_TABLES=Cas\n");
    env::set_var("KPI_REPORT_LOG_LEVEL", "debug");
    env::set_var(
        "KPI_REPORT_TABLES",
        "Cas, Izdelek,Kupec,Lokacija,Popust,SocioekonomskiProfil,Demografija,tabela_dejstev",
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.tables[1], "Izdelek");

    let files_only = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .without_process_env()
        .load()
        .expect_err("star schema needs more than Cas");
    assert!(matches!(files_only, ConfigError::UnknownSchemaTable { .. }));

    clear_env();
}

#[test]
fn invalid_port_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().expect("tempdir");
    write_env_file(&dir, ".env", "KPI_REPORT_MYSQL_PORT=not-a-port\n");
    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("port must be numeric");
    assert!(matches!(err, ConfigError::InvalidValue { key: "MYSQL_PORT", .. }));

    write_env_file(&dir, ".env", "KPI_REPORT_MYSQL_PORT=0\n");
    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("port 0 is invalid");
    assert!(matches!(err, ConfigError::InvalidPort { value: 0 }));
}

#[test]
fn table_list_of_only_separators_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().expect("tempdir");
    write_env_file(&dir, ".env", "KPI_REPORT_TABLES= , ,\n");
    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("no table names given");
    assert!(matches!(err, ConfigError::NoTables));
}
