//! End-to-end tests for the script host: lifecycle, messaging, error
//! reporting, binding teardown order, and timers.

use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use graft_js::{Binding, EngineRuntime, HostServices, Script};
use rquickjs::Ctx;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

fn collect_messages(script: &Script) -> Arc<Mutex<Vec<String>>> {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    script.set_message_handler(move |message, _data| {
        sink.lock().unwrap().push(message.to_owned());
    });
    messages
}

#[test]
fn send_payload_reaches_handler() {
    init_tracing();
    let script = Script::new("send(1 + 1);").unwrap();
    let messages = collect_messages(&script);

    script.load();
    assert_eq!(
        *messages.lock().unwrap(),
        vec![r#"{"type":"send","payload":2}"#.to_owned()]
    );

    script.unload();
    assert_eq!(messages.lock().unwrap().len(), 1);
}

#[test]
fn loading_twice_runs_the_program_once() {
    init_tracing();
    let script = Script::new("send('ran');").unwrap();
    let messages = collect_messages(&script);

    script.load();
    script.load();
    assert_eq!(messages.lock().unwrap().len(), 1);
}

#[test]
fn unload_then_load_runs_against_a_fresh_context() {
    init_tracing();
    let script = Script::new(
        "globalThis.counter = (globalThis.counter || 0) + 1; send(globalThis.counter);",
    )
    .unwrap();
    let messages = collect_messages(&script);

    script.load();
    script.unload();
    script.load();

    // Globals do not survive the context rebuild, so both runs observe 1.
    assert_eq!(
        *messages.lock().unwrap(),
        vec![
            r#"{"type":"send","payload":1}"#.to_owned(),
            r#"{"type":"send","payload":1}"#.to_owned(),
        ]
    );
}

#[test]
fn uncaught_exception_becomes_an_error_message() {
    init_tracing();
    let script = Script::new("throw new Error('boom');").unwrap();
    let messages = collect_messages(&script);

    script.load();

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0],
        r#"{"type":"error","lineNumber":1,"description":"Error: boom"}"#
    );
}

#[test]
fn runtime_errors_report_the_user_line() {
    init_tracing();
    let script = Script::new("var a = 1;\nvar b = 2;\nmissing();").unwrap();
    let messages = collect_messages(&script);

    script.load();

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
    assert_eq!(parsed["type"], "error");
    assert_eq!(parsed["lineNumber"], 3);
    assert!(
        parsed["description"]
            .as_str()
            .unwrap()
            .contains("not defined")
    );
}

struct RecordingBinding {
    tag: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Binding for RecordingBinding {
    fn name(&self) -> &'static str {
        self.tag
    }

    fn init(&mut self, _services: &HostServices, _ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        self.log.lock().unwrap().push(format!("init:{}", self.tag));
        Ok(())
    }

    fn realize(&mut self, _ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("realize:{}", self.tag));
        Ok(())
    }

    fn dispose(&mut self, _ctx: &Ctx<'_>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("dispose:{}", self.tag));
    }

    fn finalize(&mut self) {
        self.log
            .lock()
            .unwrap()
            .push(format!("finalize:{}", self.tag));
    }
}

#[test]
fn bindings_tear_down_in_reverse_registration_order() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let bindings: Vec<Box<dyn Binding>> = vec![
        Box::new(RecordingBinding {
            tag: "first",
            log: log.clone(),
        }),
        Box::new(RecordingBinding {
            tag: "second",
            log: log.clone(),
        }),
        Box::new(RecordingBinding {
            tag: "third",
            log: log.clone(),
        }),
    ];

    let script = Script::with_bindings("var x = 0;", bindings).unwrap();
    script.load();
    script.unload();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "init:first",
            "init:second",
            "init:third",
            "realize:first",
            "realize:second",
            "realize:third",
            "dispose:third",
            "dispose:second",
            "dispose:first",
            "finalize:third",
            "finalize:second",
            "finalize:first",
        ]
    );
}

#[test]
fn dropping_a_loaded_script_tears_it_down() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let bindings: Vec<Box<dyn Binding>> = vec![Box::new(RecordingBinding {
        tag: "only",
        log: log.clone(),
    })];

    {
        let script = Script::with_bindings("var z = 3;", bindings).unwrap();
        script.load();
    }

    let log = log.lock().unwrap();
    assert!(log.contains(&"dispose:only".to_owned()));
    assert!(log.contains(&"finalize:only".to_owned()));
}

#[test]
fn posted_message_reaches_a_registered_recv_callback() {
    init_tracing();
    let script = Script::new("recv(function (m) { send(m.n + 1); });").unwrap();
    let messages = collect_messages(&script);

    script.load();
    script.post_message(r#"{"n":41}"#);

    // recv callbacks are one-shot; a second post finds no callback.
    script.post_message(r#"{"n":100}"#);

    assert_eq!(
        *messages.lock().unwrap(),
        vec![r#"{"type":"send","payload":42}"#.to_owned()]
    );
}

#[test]
fn message_posted_to_unloaded_script_is_dropped() {
    init_tracing();
    let script = Script::new("recv(function (m) { send(m); });").unwrap();
    let messages = collect_messages(&script);

    script.post_message(r#"{"n":1}"#);
    assert!(messages.lock().unwrap().is_empty());
}

#[test]
fn timer_callback_fires_through_the_event_loop() {
    init_tracing();
    let script = Script::new("setTimeout(function () { send('tick'); }, 10);").unwrap();
    let messages = collect_messages(&script);

    script.load();

    let event_loop = EngineRuntime::acquire().event_loop();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        event_loop.run_pending();
        if !messages.lock().unwrap().is_empty() {
            break;
        }
        assert!(Instant::now() < deadline, "timer never fired");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(
        *messages.lock().unwrap(),
        vec![r#"{"type":"send","payload":"tick"}"#.to_owned()]
    );
}

#[test]
fn cleared_timer_never_fires() {
    init_tracing();
    let script =
        Script::new("var id = setTimeout(function () { send('late'); }, 20); clearTimeout(id);")
            .unwrap();
    let messages = collect_messages(&script);

    script.load();

    let event_loop = EngineRuntime::acquire().event_loop();
    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        event_loop.run_pending();
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(messages.lock().unwrap().is_empty());
}

#[test]
fn clearing_an_unknown_timer_is_harmless() {
    init_tracing();
    let script = Script::new("clearTimeout(999999); send('ok');").unwrap();
    let messages = collect_messages(&script);

    script.load();

    assert_eq!(
        *messages.lock().unwrap(),
        vec![r#"{"type":"send","payload":"ok"}"#.to_owned()]
    );
}

#[test]
fn message_handler_may_reenter_the_script_api() {
    init_tracing();
    let script = Script::new("send('ping');").unwrap();
    let messages = Arc::new(Mutex::new(Vec::new()));

    let sink = messages.clone();
    let reentrant = script.clone();
    script.set_message_handler(move |message, _data| {
        // Re-entering load() while loaded is a no-op and must not block on
        // the script's own state.
        reentrant.load();
        sink.lock().unwrap().push(message.to_owned());
    });

    script.load();
    assert_eq!(
        *messages.lock().unwrap(),
        vec![r#"{"type":"send","payload":"ping"}"#.to_owned()]
    );

    // The handler holds a script clone; release it to break the cycle.
    script.clear_message_handler();
}

#[test]
fn script_handles_move_between_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Script>();
}

#[test]
fn interceptor_listeners_attach_and_detach() {
    init_tracing();
    let script = Script::new(
        "var id = Interceptor.attach('open', { onEnter: function () {} });\
         send(id);\
         Interceptor.detachAll();\
         send(Object.keys(__graftListeners).length);",
    )
    .unwrap();
    let messages = collect_messages(&script);

    script.load();
    script.unload();

    assert_eq!(
        *messages.lock().unwrap(),
        vec![
            r#"{"type":"send","payload":1}"#.to_owned(),
            r#"{"type":"send","payload":0}"#.to_owned(),
        ]
    );
}

#[test]
fn replacing_the_message_handler_releases_the_previous_one() {
    init_tracing();
    struct DropProbe(Arc<Mutex<u32>>);
    impl Drop for DropProbe {
        fn drop(&mut self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    let drops = Arc::new(Mutex::new(0u32));
    let script = Script::new("var q = 0;").unwrap();

    let probe = DropProbe(drops.clone());
    script.set_message_handler(move |_message, _data| {
        let _ = &probe;
    });
    assert_eq!(*drops.lock().unwrap(), 0);

    script.set_message_handler(|_message, _data| {});
    assert_eq!(*drops.lock().unwrap(), 1);

    script.clear_message_handler();
    assert_eq!(*drops.lock().unwrap(), 1);
}

#[test]
fn scripts_on_separate_threads_do_not_interfere() {
    init_tracing();
    let handles: Vec<_> = (0..2)
        .map(|i| {
            std::thread::spawn(move || {
                let script = Script::new(format!("send({i});")).unwrap();
                let messages = collect_messages(&script);
                script.load();
                script.unload();
                messages.lock().unwrap().clone()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let messages = handle.join().unwrap();
        assert_eq!(messages, vec![format!(r#"{{"type":"send","payload":{i}}}"#)]);
    }
}

#[test]
fn tracer_state_follows_script_commands() {
    init_tracing();
    let script = Script::new("Stalker.follow();").unwrap();
    let _messages = collect_messages(&script);

    assert!(!script.tracer().is_following());
    script.load();
    assert!(script.tracer().is_following());

    // Deferred trace events are drained when the scope closes.
    assert_eq!(script.tracer().pending_count(), 0);

    script.unload();
    assert!(!script.tracer().is_following());
}

#[test]
fn builtin_objects_are_installed() {
    init_tracing();
    let script = Script::new(
        "send([\
           typeof Script, typeof Memory, typeof Process, typeof Thread,\
           typeof Module, typeof File, typeof Socket, typeof Interceptor,\
           typeof Stalker, typeof DebugSymbol, typeof Instruction,\
         ].join(','));",
    )
    .unwrap();
    let messages = collect_messages(&script);

    script.load();

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
    assert_eq!(
        parsed["payload"],
        "object,object,object,object,object,object,object,object,object,object,object"
    );
}

#[test]
fn subsystem_stubs_return_expected_shapes() {
    init_tracing();
    let script = Script::new(
        "send({\
           backtrace: Thread.backtrace(),\
           modules: Module.enumerate(),\
           base: Module.findBaseAddress('libc'),\
           addresses: Socket.localAddresses(),\
           socketType: Socket.type(3),\
           symbol: DebugSymbol.fromAddress(4096),\
           insn: Instruction.parse(4096),\
         });",
    )
    .unwrap();
    let messages = collect_messages(&script);

    script.load();

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
    let payload = &parsed["payload"];
    assert_eq!(payload["backtrace"], serde_json::json!([]));
    assert_eq!(payload["modules"], serde_json::json!([]));
    assert_eq!(payload["base"], serde_json::Value::Null);
    assert_eq!(payload["addresses"], serde_json::json!(["127.0.0.1", "::1"]));
    assert_eq!(payload["socketType"], serde_json::Value::Null);
    assert_eq!(payload["symbol"]["address"], 4096);
    assert_eq!(payload["symbol"]["name"], serde_json::Value::Null);
    assert_eq!(payload["insn"]["mnemonic"], "unknown");
    assert_eq!(payload["insn"]["size"], 0);
}

#[test]
fn memory_handles_round_trip_and_reject_garbage() {
    init_tracing();
    let script = Script::new(
        "var h = Memory.allocUtf8String('hello');\
         Memory.writeUtf8String(h, 'bye');\
         send(Memory.readUtf8String(h));\
         try { Memory.readUtf8String(999999); } catch (e) { send(String(e)); }",
    )
    .unwrap();
    let messages = collect_messages(&script);

    script.load();

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], r#"{"type":"send","payload":"bye"}"#);
    assert!(messages[1].contains("invalid memory handle"));
}
