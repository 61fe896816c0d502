//! Integration tests for stat-harvest
//!
//! These tests run the real `stat-worker` binary against stats trees built in
//! temporary directories.

use stat_harvest::config::{expand_patterns, PoolSettings, ScannedVariable, VariableConfig, WorkerCommand};
use stat_harvest::dispatch::{discover_files, execute, Dispatcher, VariablePlan};
use stat_harvest::output::ResultTable;
use stat_harvest::stats::ReducedValue;
use stat_harvest::worker::WorkerPool;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const STATS: &str = "\
---------- Begin Simulation Statistics ----------
cpuIpc                              1.5        # Instructions per cycle
cacheMisses::cpu0                   10         # Misses per core
cacheMisses::cpu1                   20
cacheMisses::total                  30
system.mem.latency::0-30            30         100.00%  100.00%
system.mem.queue::underflows        0
system.mem.queue::0                 2
system.mem.queue::1                 5
system.mem.queue::overflows         1
system.ctrl0.reads                  10
system.ctrl1.reads                  30
system.isa                          riscv
---------- End Simulation Statistics   ----------
";

fn worker_settings(pool_size: usize) -> PoolSettings {
    PoolSettings::new(WorkerCommand::new(env!("CARGO_BIN_EXE_stat-worker")))
        .pool_size(pool_size)
        .startup_timeout(Duration::from_secs(10))
        .request_timeout(Duration::from_secs(30))
}

fn stats_tree(runs: &[&str]) -> TempDir {
    let dir = tempdir().unwrap();
    for run in runs {
        let run_dir = dir.path().join(run);
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(run_dir.join("stats.txt"), STATS).unwrap();
    }
    dir
}

fn basic_variables() -> Vec<VariableConfig> {
    vec![
        VariableConfig::new("cpuIpc", "scalar"),
        VariableConfig::new("cacheMisses", "vector").with_entries(&["cpu0", "cpu1"]),
    ]
}

fn cell<'a>(table: &'a ResultTable, row: usize, column: &str) -> &'a str {
    let idx = table
        .header()
        .iter()
        .position(|h| h == column)
        .unwrap_or_else(|| panic!("missing column {}", column));
    &table.rows()[row][idx]
}

#[test]
fn test_execute_end_to_end() {
    let dir = stats_tree(&["run0", "run1", "nested/run2"]);

    let mut maps = execute(dir.path(), "stats.txt", basic_variables(), worker_settings(2)).unwrap();
    assert_eq!(maps.len(), 3);

    for map in &mut maps {
        assert!(map.contains_key("cpuIpc"));
        assert!(map.contains_key("cacheMisses"));

        let ipc = map.get_mut("cpuIpc").unwrap();
        ipc.finalize().unwrap();
        assert_eq!(ipc.reduced_content().unwrap(), ReducedValue::Number(1.0));

        let misses = map.get_mut("cacheMisses").unwrap();
        misses.finalize().unwrap();
        let reduced = misses.reduced_content().unwrap();
        let entries = reduced.as_entries().unwrap();
        assert_eq!(entries["cpu0"], 10.0);
        assert_eq!(entries["cpu1"], 20.0);
        assert_eq!(entries.len(), 2);
    }
}

#[test]
fn test_every_variable_type_to_csv() {
    let dir = stats_tree(&["a", "b"]);

    let scanned = vec![
        ScannedVariable::new("system.ctrl0.reads"),
        ScannedVariable::new("system.ctrl1.reads"),
    ];
    let variables = expand_patterns(
        vec![
            VariableConfig::new("cpuIpc", "scalar"),
            VariableConfig::new("cacheMisses", "vector").with_entries(&["cpu0", "cpu1"]),
            VariableConfig::new("cacheMisses__get_summary", "scalar"),
            VariableConfig::new("system.mem.latency", "histogram").with_rebinning(3, 30.0),
            VariableConfig::new("system.mem.queue", "distribution").with_range(0, 1),
            VariableConfig::new(r"system\.ctrl\d+\.reads", "scalar"),
            VariableConfig::new("system.isa", "configuration"),
            VariableConfig::new("system.absent", "configuration").with_on_empty("n/a"),
        ],
        &scanned,
    );

    let plan = VariablePlan::new(variables).unwrap();
    let pool = WorkerPool::new(worker_settings(2)).unwrap();
    let files = discover_files(dir.path(), "stats.txt").unwrap();
    assert_eq!(files.len(), 2);

    let batch = Dispatcher::new(&pool, &plan, 4).run(files).unwrap();
    assert!(batch.completed);
    assert!(batch.failures.is_empty());
    assert!(batch.bytes > 0);

    let table = ResultTable::build(&plan.names(), batch.results).unwrap();
    assert_eq!(table.rows().len(), 2);

    for row in 0..2 {
        assert_eq!(cell(&table, row, "cpuIpc"), "1.0");
        assert_eq!(cell(&table, row, "cacheMisses..cpu0"), "10.0");
        assert_eq!(cell(&table, row, "cacheMisses..cpu1"), "20.0");
        assert_eq!(cell(&table, row, "cacheMisses__get_summary"), "30.0");
        assert_eq!(cell(&table, row, "system.mem.latency..0-15"), "15.0");
        assert_eq!(cell(&table, row, "system.mem.latency..15-30"), "15.0");
        assert_eq!(cell(&table, row, "system.mem.latency..30+"), "0.0");
        assert_eq!(cell(&table, row, "system.mem.queue..0-"), "0.0");
        assert_eq!(cell(&table, row, "system.mem.queue..1"), "5.0");
        assert_eq!(cell(&table, row, "system.mem.queue..1+"), "1.0");
        assert_eq!(cell(&table, row, r"system\.ctrl\d+\.reads"), "20.0");
        assert_eq!(cell(&table, row, "system.isa"), "riscv");
        assert_eq!(cell(&table, row, "system.absent"), "n/a");
    }

    let output = dir.path().join("results.csv");
    table.write_csv(&output).unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("cpuIpc,cacheMisses..cpu0,cacheMisses..cpu1,"));

    let stats = pool.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.healthy_workers, 2);
    pool.shutdown();
}

#[test]
fn test_missing_file_does_not_abort_batch() {
    let dir = stats_tree(&["ok"]);
    let plan = VariablePlan::new(basic_variables()).unwrap();
    let pool = WorkerPool::new(worker_settings(1)).unwrap();

    let mut files = discover_files(dir.path(), "stats.txt").unwrap();
    files.push(dir.path().join("vanished/stats.txt"));

    let batch = Dispatcher::new(&pool, &plan, 2).run(files).unwrap();
    assert_eq!(batch.results.len(), 1);
    assert_eq!(batch.failures.len(), 1);
    assert!(batch.failures[0].error.is_per_file());
}

#[test]
fn test_single_file_input() {
    let dir = stats_tree(&["only"]);
    let file = dir.path().join("only/stats.txt");

    let maps = execute(&file, "ignored.txt", basic_variables(), worker_settings(1)).unwrap();
    assert_eq!(maps.len(), 1);
}

#[test]
fn test_worker_binary_protocol() {
    let dir = stats_tree(&["run"]);
    let file = dir.path().join("run/stats.txt");

    let mut child = Command::new(env!("CARGO_BIN_EXE_stat-worker"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    let mut read_line = || {
        let mut line = String::new();
        stdout.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    };

    assert_eq!(read_line(), "READY");

    writeln!(stdin, "PING").unwrap();
    stdin.flush().unwrap();
    assert_eq!(read_line(), "PONG");

    writeln!(stdin, "PARSE {}||cpuIpc", file.display()).unwrap();
    stdin.flush().unwrap();
    assert_eq!(read_line(), "scalar/cpuIpc/1.5");
    assert_eq!(read_line(), "END_PARSE");

    writeln!(stdin, "SHUTDOWN").unwrap();
    stdin.flush().unwrap();
    assert!(child.wait().unwrap().success());
}

#[test]
fn test_variables_json_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vars.json");
    fs::write(
        &path,
        r#"[
            {"name": "cpuIpc", "type": "scalar"},
            {"name": "cacheMisses", "type": "Vector", "vectorEntries": "cpu0, cpu1"},
            {"name": "isa", "type": "configuration", "onEmpty": "unknown"}
        ]"#,
    )
    .unwrap();

    let variables = stat_harvest::config::load_variables(Path::new(&path)).unwrap();
    let plan = VariablePlan::new(variables).unwrap();
    assert_eq!(plan.names(), vec!["cpuIpc", "cacheMisses", "isa"]);
    assert_eq!(plan.keys(), &["cpuIpc", "cacheMisses", "isa"]);
}
