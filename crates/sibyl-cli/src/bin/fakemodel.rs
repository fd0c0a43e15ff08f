//! A model host with canned answers, for integration tests.
//!
//! Speaks the model protocol on stdin/stdout. It only accepts a model
//! directory named `fakemodel-data`, counts one token per space plus one,
//! and knows a handful of prompts:
//!
//! - the search-term prompt answers `- Foo` and `- Bar`;
//! - the answer prompt answers `Test answer.` if both test articles are in it;
//! - `pid` answers the process id;
//! - `sleep` blocks until the process is interrupted.

use std::path::Path;

use sibyl_core::{
    CodecError, ConfigRequest, ConfigResponse, FrameBuffer, GenerateRequest, GenerateResponse,
    ModelFunction, TokenCountRequest, TokenCountResponse,
};

const MODEL_DIR_NAME: &str = "fakemodel-data";

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let mut interrupts =
        Interrupts::install().map_err(|e| miette::miette!("Failed to install handler: {}", e))?;
    serve(&mut interrupts)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

async fn serve(interrupts: &mut Interrupts) -> Result<(), CodecError> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut inbuf = FrameBuffer::new();
    let mut outbuf = FrameBuffer::new();
    let mut configured = false;

    loop {
        let req = match inbuf.read_request(&mut stdin).await {
            Ok(req) => req,
            Err(CodecError::Eof) => return Ok(()),
            Err(e) => return Err(e),
        };
        match req.function {
            ModelFunction::Config => {
                let req: ConfigRequest = req.decode()?;
                let mut resp = ConfigResponse::default();
                if Path::new(&req.model_dir).file_name() == Some(MODEL_DIR_NAME.as_ref()) {
                    configured = true;
                } else {
                    resp.error = "bad model directory".to_string();
                }
                outbuf.write_frame(&mut stdout, &resp).await?;
            }
            ModelFunction::TokenCount => {
                let req: TokenCountRequest = req.decode()?;
                let mut resp = TokenCountResponse::default();
                if configured {
                    resp.token_count = req.prompt.matches(' ').count() as i32 + 1;
                } else {
                    resp.error = "model not yet configured".to_string();
                }
                outbuf.write_frame(&mut stdout, &resp).await?;
            }
            ModelFunction::Generate => {
                let req: GenerateRequest = req.decode()?;
                let resp = if configured {
                    generate(&req.prompt, interrupts).await
                } else {
                    GenerateResponse {
                        error: "model not yet configured".to_string(),
                        ..Default::default()
                    }
                };
                outbuf.write_frame(&mut stdout, &resp).await?;
            }
        }
    }
}

async fn generate(prompt: &str, interrupts: &mut Interrupts) -> GenerateResponse {
    let mut resp = GenerateResponse::default();
    if prompt.contains("most likely to return relevant results") {
        resp.generated = "- Foo\n- Bar\n".to_string();
    } else if prompt.contains("Answer the following question:") {
        if prompt.contains("Article about Foo.") && prompt.contains("Article about Bar.") {
            resp.generated = "Test answer.\n".to_string();
        } else {
            resp.error = "missing expected background content".to_string();
        }
    } else if prompt == "pid" {
        resp.generated = std::process::id().to_string();
    } else if prompt == "sleep" {
        interrupts.wait().await;
        resp.error = "interrupted".to_string();
    } else {
        resp.error = format!("unrecognized test prompt: {prompt:?}");
    }
    resp
}

/// The interrupt signal sent by the host. Installing the handler also keeps
/// the signal from terminating the process.
#[cfg(unix)]
struct Interrupts(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Interrupts {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::user_defined1())?))
    }

    async fn wait(&mut self) {
        self.0.recv().await;
    }
}

#[cfg(not(unix))]
struct Interrupts;

#[cfg(not(unix))]
impl Interrupts {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn wait(&mut self) {
        std::future::pending::<()>().await;
    }
}
