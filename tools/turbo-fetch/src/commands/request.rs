//! Request command.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _, Result};
use turbo_auth::{AuthenticationInterceptor, BearerAuthenticator, BearerToken, EndpointRefresher};
use turbo_cache::{CacheConfig, SingleFlightCache};
use turbo_net::{Endpoint, NetworkError, Session};

use super::RequestArgs;
use crate::context::Context;
use crate::output::{format_bytes, status_badge};
use crate::transport::ReqwestTransport;

/// Run the request command.
pub async fn run(args: RequestArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    if config.session.base_url.is_empty() && !args.path.contains("://") {
        bail!("No base URL configured; pass --base-url or set base_url in turbo.toml");
    }

    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.timeout_secs,
    ))?);
    let session = build_session(&args, ctx, transport.clone());
    let endpoint = build_endpoint(&args)?;

    ctx.output.kv("method", endpoint.method().as_str());
    ctx.output.kv("base url", session.base_url());

    if args.repeat > 1 {
        return run_repeated(&args, ctx, &session, &endpoint, &transport).await;
    }

    let started = Instant::now();
    match session.response(&endpoint).await {
        Ok(response) => {
            ctx.output.kv("status", &status_badge(response.status));
            ctx.output.kv("elapsed", &format!("{:?}", started.elapsed()));
            ctx.output.kv("size", &format_bytes(response.bytes().len()));
            ctx.output.body(response.bytes());
            Ok(())
        }
        Err(error) => Err(describe(error)),
    }
}

fn build_session(args: &RequestArgs, ctx: &Context, transport: Arc<ReqwestTransport>) -> Session {
    let config = &ctx.config;
    let mut chain = config.session.interceptor();

    let token = args.token.clone().or_else(|| config.auth.token.clone());
    if let Some(token) = token {
        let mut bearer = BearerToken::new(token);
        if let Some(refresh) = args
            .refresh_token
            .clone()
            .or_else(|| config.auth.refresh_token.clone())
        {
            bearer = bearer.with_refresh_token(refresh);
        }

        // Token refreshes go through a plain session so they never wait on
        // the interceptor's own lock.
        let refresh_session = Session::builder_shared(transport.clone())
            .with_base_url(config.session.base_url.clone())
            .build();
        let refresher = EndpointRefresher::new(
            refresh_session,
            Endpoint::post(config.auth.token_endpoint.clone()),
        );
        chain = chain.with_interceptor(AuthenticationInterceptor::new(
            BearerAuthenticator::new(refresher).with_token(bearer),
        ));
    }

    let mut builder = Session::builder_shared(transport)
        .with_base_url(config.session.base_url.clone())
        .with_interceptor(chain);
    if let Some(max) = args.max_retries.or(config.session.max_retries) {
        builder = builder.with_max_retries(max);
    }
    builder.build()
}

fn build_endpoint(args: &RequestArgs) -> Result<Endpoint> {
    let mut endpoint = Endpoint::new(args.method.into(), args.path.clone());

    for param in &args.params {
        let (key, value) = param
            .split_once('=')
            .with_context(|| format!("Invalid parameter '{}', expected key=value", param))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        endpoint = endpoint.parameter(key, value);
    }

    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Invalid header '{}', expected 'Name: value'", header))?;
        endpoint = endpoint.header(name.trim(), value.trim());
    }

    if let Some(task_id) = &args.task_id {
        endpoint = endpoint.task_id(task_id.clone());
    }
    Ok(endpoint)
}

async fn run_repeated(
    args: &RequestArgs,
    ctx: &Context,
    session: &Session,
    endpoint: &Endpoint,
    transport: &ReqwestTransport,
) -> Result<()> {
    let cache: SingleFlightCache<Vec<u8>> =
        SingleFlightCache::with_config(CacheConfig::from(&ctx.config.session.cache));
    let key = cache.task_key(endpoint, session.base_url());

    let calls = (0..args.repeat).map(|_| {
        let session = session.clone();
        let endpoint = endpoint.clone();
        cache.execute(key.clone(), async move { session.data(&endpoint).await })
    });
    let results = futures::future::join_all(calls).await;

    let mut body = None;
    for result in results {
        body = Some(result.map_err(describe)?);
    }

    ctx.output.success(&format!(
        "{} calls, {} network requests",
        args.repeat,
        transport.submissions()
    ));
    if let Some(body) = body {
        ctx.output.body(&body);
    }
    Ok(())
}

fn describe(error: NetworkError) -> anyhow::Error {
    if let NetworkError::Remote { status, body } = &error {
        let text = String::from_utf8_lossy(body);
        return anyhow::anyhow!("HTTP {}: {}", status, text.trim());
    }
    anyhow::Error::new(error)
}
