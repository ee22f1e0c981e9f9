//! Configuration file loading tests.

use std::io::Write;

use callsift::Config;

#[test]
fn load_reads_a_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [llm]
        local_base_url = "http://ollama:11434"
        hebrew_model = "dictalm-fast"
        remote_endpoint = "https://llm.example.com"

        [cache]
        enabled = true
        max_entries = 500

        [embedding]
        dimension = 768
        batch_size = 16

        [vector]
        base_url = "http://weaviate:8080"

        [pipeline]
        batch_size = 4
        enable_vector_storage = false
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).expect("config should parse");
    assert_eq!(config.llm.local_base_url, "http://ollama:11434");
    assert_eq!(config.llm.hebrew_model, "dictalm-fast");
    assert_eq!(
        config.llm.remote_endpoint.as_deref(),
        Some("https://llm.example.com")
    );
    assert_eq!(config.cache.max_entries, 500);
    assert_eq!(config.embedding.batch_size, 16);
    assert_eq!(config.vector.base_url, "http://weaviate:8080");
    assert_eq!(config.pipeline.batch_size, 4);
    assert!(!config.pipeline.enable_vector_storage);
    // Untouched sections keep their defaults.
    assert!(config.llm.hebrew_routing);
    assert_eq!(config.cache.ttl_secs, 3600);
}

#[test]
fn invalid_toml_is_a_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[llm\nbroken").unwrap();

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, callsift::CallsiftError::Configuration(_)));
}
