//! Hosts a stand-in for a heavy SDK in a sibling instance and drives it the
//! way a main unit would, through client handles.

use anyhow::{anyhow, Context};
use clap::Parser;
use overwork::core::planner::plan_for;
use overwork::protocol::{
    function, method, Arg, ClientModule, Env, HostObject, HostValue, Namespace, ProtocolError,
    Remote, SiblingEntrypoint, Value,
};
use overwork::utils::logger;
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Debug, Parser)]
#[command(name = "overwork-demo")]
#[command(about = "Run a relocated package in-process and call it through handles")]
struct DemoArgs {
    #[arg(long, default_value = "1024", help = "Reference store bound of the sibling")]
    store_capacity: usize,

    #[arg(long, default_value = "16", help = "Pending calls the sibling queues")]
    queue_depth: usize,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,
}

/// A stateful object the SDK hands out; it only makes sense by reference.
struct Session {
    user: String,
    events: Mutex<Vec<String>>,
}

impl HostObject for Session {
    fn type_name(&self) -> &str {
        "Session"
    }

    fn get(&self, key: &str) -> Option<HostValue> {
        match key {
            "user" => Some(HostValue::from(self.user.clone())),
            "track" => Some(method(|session: &Session, args| {
                let event = args
                    .first()
                    .and_then(HostValue::as_str)
                    .ok_or_else(|| ProtocolError::host("track expects an event name"))?;
                let mut events = session
                    .events
                    .lock()
                    .map_err(|_| ProtocolError::host("session state poisoned"))?;
                events.push(event.to_string());
                Ok(HostValue::Number(events.len() as f64))
            })),
            "summary" => Some(method(|session: &Session, _args| {
                let events = session
                    .events
                    .lock()
                    .map_err(|_| ProtocolError::host("session state poisoned"))?;
                Ok(HostValue::record([
                    ("user", HostValue::from(session.user.clone())),
                    ("count", HostValue::Number(events.len() as f64)),
                    (
                        "events",
                        HostValue::Array(events.iter().map(|e| HostValue::from(e.as_str())).collect()),
                    ),
                ]))
            })),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn heavy_sdk() -> Namespace {
    Namespace::new("heavy-sdk")
        .export("VERSION", HostValue::from("4.2.0"))
        .export(
            "shout",
            function(|args| async move {
                let text = args.first().and_then(HostValue::as_str).unwrap_or_default();
                Ok(HostValue::from(format!("{}!", text.to_uppercase())))
            }),
        )
        .export(
            "parse",
            function(|args| async move {
                let line = args.first().and_then(HostValue::as_str).unwrap_or_default();
                let (key, value) = line.split_once('=').unwrap_or((line, ""));
                Ok(HostValue::record([
                    ("key", HostValue::from(key.trim())),
                    ("value", HostValue::from(value.trim())),
                ]))
            }),
        )
        .export(
            "startSession",
            function(|args| async move {
                let user = args.first().and_then(HostValue::as_str).unwrap_or("anonymous");
                Ok(HostValue::object(Session {
                    user: user.to_string(),
                    events: Mutex::new(Vec::new()),
                }))
            }),
        )
        .export(
            "applyTwice",
            function(|args| async move {
                let mut args = args.into_iter();
                let Some(HostValue::Function(f)) = args.next() else {
                    return Err(ProtocolError::host("applyTwice expects a function"));
                };
                let input = args.next().unwrap_or(HostValue::Null);
                let once = f.call(HostValue::Null, vec![input]).await?;
                f.call(HostValue::Null, vec![once]).await
            }),
        )
}

fn expect_value(remote: Remote) -> anyhow::Result<Value> {
    remote
        .into_value()
        .ok_or_else(|| anyhow!("expected a by-value result, got a handle"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DemoArgs::parse();
    logger::init_cli_logger(args.verbose);

    let mut plan = plan_for("heavy-sdk");
    plan.export_names = heavy_sdk().export_names().map(str::to_string).collect();

    let channel = SiblingEntrypoint::new(&plan, heavy_sdk(), args.store_capacity)
        .spawn(args.queue_depth);
    let env = Env::new().with_binding(plan.binding_name.clone(), Arc::new(channel));
    let sdk = ClientModule::new(&plan, &env).context("binding the sibling")?;

    println!("Exports: {}", sdk.export_names().collect::<Vec<_>>().join(", "));

    let shout = sdk.handle("shout").context("shout handle")?;
    let shouted = expect_value(shout.call(vec!["relocated".into()]).await?)?;
    println!("shout(\"relocated\") = {:?}", shouted.as_str());

    let parse = sdk.handle("parse").context("parse handle")?;
    let parsed = expect_value(parse.call(vec!["region = eu-west".into()]).await?)?;
    println!(
        "parse(...) = {{ key: {:?}, value: {:?} }}",
        parsed.get("key").and_then(Value::as_str),
        parsed.get("value").and_then(Value::as_str)
    );

    let start = sdk.handle("startSession").context("startSession handle")?;
    let session = start
        .call(vec!["ada".into()])
        .await?
        .into_handle()
        .context("sessions come back by reference")?;
    let track = session.member("track").context("track handle")?;
    for event in ["login", "search", "logout"] {
        track.call(vec![event.into()]).await?;
    }
    let summary = expect_value(
        session
            .member("summary")
            .context("summary handle")?
            .call(vec![])
            .await?,
    )?;
    println!(
        "session summary: user={:?} count={:?}",
        summary.get("user").and_then(Value::as_str),
        summary.get("count").and_then(Value::as_f64)
    );

    let apply_twice = sdk.handle("applyTwice").context("applyTwice handle")?;
    let twice = expect_value(
        apply_twice
            .call(vec![Arg::from(&shout), "hi".into()])
            .await?,
    )?;
    println!("applyTwice(shout, \"hi\") = {:?}", twice.as_str());

    let blocked = sdk
        .default_handle()
        .at("shout.constructor")
        .context("blocked handle")?;
    match blocked.call(vec![]).await {
        Err(e @ ProtocolError::PathViolationError { .. }) => println!("shout.constructor() rejected: {}", e),
        other => return Err(anyhow!("deny-listed path was not rejected: {:?}", other)),
    }

    Ok(())
}
