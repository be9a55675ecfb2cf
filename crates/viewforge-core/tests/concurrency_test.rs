//! Concurrent renders through one module keep their state apart

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use viewforge_core::{RenderRequest, ViewConfig, ViewModule};

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_parses_see_only_their_own_state() {
    let dir = TempDir::new().unwrap();
    for site in ["alpha", "beta"] {
        write(
            dir.path(),
            &format!("{site}/home.html"),
            &format!(
                r#"{{{{ layout(name="main") }}}}{{{{ title(value="{site}-title") }}}}{{{{ render(name="card") }}}}"#
            ),
        );
        write(dir.path(), &format!("{site}/card.html"), &format!("[{site} card]"));
    }
    write(
        dir.path(),
        "shared/main.html",
        "<title>{{ title() }}</title>{{ body() }}",
    );

    let module = Arc::new(ViewModule::new());
    module
        .register_config(ViewConfig {
            root: dir.path().to_path_buf(),
            ..ViewConfig::default()
        })
        .unwrap();
    module.open().unwrap();
    module.start().unwrap();

    let mut handles = Vec::new();
    for round in 0..32 {
        let site = if round % 2 == 0 { "alpha" } else { "beta" };
        let module = Arc::clone(&module);
        handles.push(tokio::task::spawn_blocking(move || {
            let output = module
                .parse(RenderRequest::new("home").with_site(site))
                .unwrap();
            (site, output)
        }));
    }

    for handle in handles {
        let (site, output) = handle.await.unwrap();
        assert_eq!(
            output,
            format!("<title>{site}-title</title>[{site} card]")
        );
    }

    assert_eq!(module.health().unwrap().workload, 0);
    module.close().unwrap();
}
