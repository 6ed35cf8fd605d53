//! Capability facades against an in-memory service.

mod common;

use common::{Delayed, FakeServer};
use skiff_core::transport::{Method, DATA_TOKEN_HEADER};
use skiff_core::{
    Client, CodeLanguage, Error, ErrorKind, ExecuteOptions, ResourceKind, Sandbox, SandboxInput,
    TemplateType, WriteOptions,
};
use std::sync::Arc;
use std::time::Duration;

async fn sandbox(server: &Arc<FakeServer>, template_type: TemplateType) -> (Client, Sandbox) {
    server.add_template("tpl", template_type.as_str());
    let client = common::client(server);
    let sandbox = client
        .create(template_type, SandboxInput::new("tpl"))
        .await
        .unwrap();
    (client, sandbox)
}

#[tokio::test]
async fn test_context_state_persists_until_release() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;

    let context_id = sandbox
        .with_context(CodeLanguage::Python, |ctx| async move {
            ctx.execute("x = 10", None).await?;
            let out = ctx.execute("print(x)", None).await?;
            assert_eq!(out.stdout(), "10\n");
            assert!(out.error.is_none());
            Ok::<_, Error>(ctx.id().to_string())
        })
        .await
        .unwrap();

    let contexts = sandbox.contexts().unwrap();
    let err = contexts.get(&context_id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            kind: ResourceKind::Context,
            ..
        }
    ));

    let err = contexts
        .execute("print(x)", ExecuteOptions::new().context(context_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_stateless_execute_reports_exception() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;
    let contexts = sandbox.contexts().unwrap();

    let result = contexts
        .execute("print(y)", ExecuteOptions::new())
        .await
        .unwrap();
    let error = result.error.clone().unwrap();
    assert_eq!(error.name, "NameError");
    assert!(matches!(
        result.into_result(),
        Err(Error::RemoteExecution { .. })
    ));

    let body = server.calls().last().unwrap().json_body().cloned().unwrap();
    assert_eq!(body["language"], "python");
    assert!(body.get("contextId").is_none());
}

#[tokio::test]
async fn test_data_calls_carry_access_token() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;
    let contexts = sandbox.contexts().unwrap();
    contexts.list().await.unwrap();
    contexts.list().await.unwrap();

    // Token fetched once, then reused.
    assert_eq!(server.count(Method::Post, "/accessToken"), 1);
    let expected = format!("token-{}", sandbox.id());
    let last = server.calls().pop().unwrap();
    assert!(last.path.starts_with(&format!("/sandboxes/{}/", sandbox.id())));
    assert!(last
        .headers
        .iter()
        .any(|(k, v)| k == DATA_TOKEN_HEADER && *v == expected));
}

#[tokio::test]
async fn test_files_round_trip() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;
    let files = sandbox.files().unwrap();

    files
        .write("/home/user/a.txt", "hello", WriteOptions::default())
        .await
        .unwrap();
    let content = files.read("/home/user/a.txt").await.unwrap();
    assert_eq!(content.content, "hello");

    let sent = server
        .calls()
        .into_iter()
        .find(|c| c.method == Method::Post && c.path.ends_with("/files"))
        .unwrap();
    let body = sent.json_body().unwrap();
    assert_eq!(body["mode"], "644");
    assert_eq!(body["encoding"], "utf-8");
    assert_eq!(body["createDir"], true);

    let err = files.read("/missing").await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            kind: ResourceKind::File,
            ..
        }
    ));
}

#[tokio::test]
async fn test_upload_then_download() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;
    let fs = sandbox.file_system().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let local = dir.path().join("in.txt");
    std::fs::write(&local, b"payload").unwrap();
    let uploaded = fs.upload(&local, "/data/in.txt").await.unwrap();
    assert_eq!(uploaded.size, 7);

    let stat = fs.stat("/data/in.txt").await.unwrap();
    assert_eq!(stat.size, 7);

    let target = dir.path().join("nested/out.txt");
    let downloaded = fs.download("/data/in.txt", &target).await.unwrap();
    assert_eq!(downloaded.size, 7);
    assert_eq!(downloaded.saved_path, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"payload");
}

#[tokio::test]
async fn test_cmd_exit_code_is_a_result() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;
    let processes = sandbox.processes().unwrap();

    let ok = processes.cmd("echo hi", None, None).await.unwrap();
    assert!(ok.success());
    assert_eq!(ok.stdout, "hi\n");

    let failed = processes.cmd("false", None, None).await.unwrap();
    assert_eq!(failed.exit_code, 1);
    assert_eq!(failed.check().unwrap_err().kind(), ErrorKind::RemoteExecution);

    let err = processes.cmd("  ", None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_recording_download_size_matches_file() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::Browser).await;
    let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    server.add_recording("rec-1.mp4", &bytes);

    let recordings = sandbox.recordings().unwrap();
    let listed = recordings.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "rec-1.mp4");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.mp4");
    let result = recordings.download("rec-1.mp4", &path).await.unwrap();
    assert_eq!(result.size, std::fs::metadata(&path).unwrap().len());
    assert_eq!(result.size, 4096);

    recordings.delete("rec-1.mp4").await.unwrap();
    let err = recordings.download("rec-1.mp4", &path).await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            kind: ResourceKind::Recording,
            ..
        }
    ));
}

#[tokio::test]
async fn test_browser_urls() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::Browser).await;
    let browser = sandbox.browser().unwrap();

    let cdp = browser.cdp_url(false).unwrap();
    assert_eq!(
        cdp,
        format!(
            "ws://data.test/sandboxes/{}/ws/automation?tenantId=1234567890",
            sandbox.id()
        )
    );
    let vnc = browser.vnc_url(true).unwrap();
    assert!(vnc.contains("/ws/liveview?"));
    assert!(vnc.ends_with("&recording=true"));

    let headers = browser.access_headers().await.unwrap();
    assert_eq!(headers[0].0, DATA_TOKEN_HEADER);
}

#[tokio::test]
async fn test_deleted_sandbox_refuses_data_calls() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;
    let files = sandbox.files().unwrap();

    sandbox.delete().await.unwrap();
    let calls = server.call_count();
    let err = files.read("/a").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(server.call_count(), calls);
}

async fn delayed_sandbox(transport: &Arc<Delayed>) -> Sandbox {
    transport.server.add_template("tpl", "CodeInterpreter");
    common::delayed_client(transport)
        .create(TemplateType::CodeInterpreter, SandboxInput::new("tpl"))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_execute_past_timeout_is_timeout() {
    let server = FakeServer::new();
    let transport =
        Delayed::new(&server).delay(Method::Post, "/contexts/execute", Duration::from_secs(3600));
    let sandbox = delayed_sandbox(&transport).await;

    let err = sandbox
        .contexts()
        .unwrap()
        .execute(
            "print(1)",
            ExecuteOptions::new().timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
    assert_eq!(transport.completed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cmd_past_timeout_is_timeout() {
    let server = FakeServer::new();
    let transport =
        Delayed::new(&server).delay(Method::Post, "/processes/cmd", Duration::from_secs(3600));
    let sandbox = delayed_sandbox(&transport).await;

    let err = sandbox
        .processes()
        .unwrap()
        .cmd("sleep 100", None, Some(Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn test_with_context_cancelled_still_releases() {
    let server = FakeServer::new();
    let (_client, sandbox) = sandbox(&server, TemplateType::CodeInterpreter).await;

    let scope = sandbox.with_context(CodeLanguage::Python, |ctx| async move {
        ctx.execute("x = 1", None).await?;
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<_, Error>(())
    });
    assert!(tokio::time::timeout(Duration::from_secs(1), scope).await.is_err());
    assert_eq!(server.state.lock().unwrap().contexts.len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(server.state.lock().unwrap().contexts.is_empty());
    assert_eq!(server.count(Method::Delete, "/contexts/ctx-2"), 1);
}
