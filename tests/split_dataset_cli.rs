use std::path::Path;
use std::process::{Command, Output};

fn split(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_split-dataset"))
        .args(args)
        .current_dir(cwd)
        .env_remove("SOIL_CONFIG")
        .output()
        .expect("failed to spawn split-dataset")
}

#[test]
fn missing_source_root_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let output = split(&["--source", "does_not_exist", "--target", "out"], dir.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("source root does not exist"), "{}", stderr);
    assert!(!dir.path().join("out").exists());
}

#[test]
fn splits_with_config_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let class_dir = dir.path().join("raw/Sandy_soil");
    std::fs::create_dir_all(&class_dir).unwrap();
    for i in 0..10 {
        std::fs::write(class_dir.join(format!("sandy {}.png", i)), [i as u8]).unwrap();
    }
    std::fs::create_dir_all(dir.path().join("raw/Empty")).unwrap();
    std::fs::write(
        dir.path().join("soil_config.json"),
        r#"{"source": "raw", "target": "soil_cls", "trainFraction": 0.8, "seed": 42}"#,
    )
    .unwrap();

    let output = split(&[], dir.path());
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let count = |sub: &str| std::fs::read_dir(dir.path().join(sub)).unwrap().count();
    assert_eq!(count("soil_cls/train/Sandy_soil"), 8);
    assert_eq!(count("soil_cls/val/Sandy_soil"), 2);
    assert!(!dir.path().join("soil_cls/train/Empty").exists());
}
