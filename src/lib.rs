// Route Resync - audio output route resynchronization
// Best-effort nudge forcing the platform to re-bind output to the current device

// Module declarations
pub mod backend;
pub mod config;
pub mod error;
pub mod route;
pub mod telemetry;

// Re-exports for convenience
pub use backend::{AudioService, OutputStream};
pub use config::ResyncConfig;
pub use route::{
    CoalescingResynchronizer, ResyncOutcome, RouteResynchronizer, SilentBuffer, StepStatus,
    StreamFormat,
};

/// Run the route nudge against a caller-supplied audio service.
///
/// Uses the default configuration. Never returns an error; the outcome is a
/// completion signal only.
pub fn resync<S: AudioService + ?Sized>(service: &S) -> ResyncOutcome {
    RouteResynchronizer::default().resync(service)
}

/// Obtain the platform audio service and run the nudge against it.
///
/// A missing service (no Android context, no output device) is logged and
/// absorbed like any other step failure.
pub fn resync_default_output() -> ResyncOutcome {
    RouteResynchronizer::new(ResyncConfig::load()).resync_if_available(backend::default_service())
}

/// Install the logging backend. Safe to call more than once.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    match tracing_android::layer("RouteResync") {
        Ok(layer) => {
            let _ = tracing_subscriber::registry().with(layer).try_init();
        }
        Err(err) => eprintln!("RouteResync: failed to create android log layer: {}", err),
    }
}

/// Install the logging backend. Safe to call more than once.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: *mut jni::sys::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    log::info!("JNI_OnLoad called - route resync library loaded");
    telemetry::hub().record_lifecycle(telemetry::LifecyclePhase::LibraryLoaded);

    jni::sys::JNI_VERSION_1_6
}

/// `RouteResync.nativeInit(Context)`: register the application context.
///
/// Must run once before `nativeResync` can reach `AudioManager`.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn Java_com_routeresync_RouteResync_nativeInit<'local>(
    mut env: jni::JNIEnv<'local>,
    _class: jni::objects::JClass<'local>,
    context: jni::objects::JObject<'local>,
) -> jni::sys::jboolean {
    match backend::initialize_android_context(&mut env, &context) {
        Ok(()) => {
            telemetry::hub().record_lifecycle(telemetry::LifecyclePhase::ContextInitialized);
            jni::sys::JNI_TRUE
        }
        Err(err) => {
            error::log_resync_error(&err, "context initialization");
            telemetry::hub().record_lifecycle(telemetry::LifecyclePhase::ContextFailed);
            jni::sys::JNI_FALSE
        }
    }
}

/// `RouteResync.nativeResync()`: run the nudge; true when both steps applied.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn Java_com_routeresync_RouteResync_nativeResync<'local>(
    _env: jni::JNIEnv<'local>,
    _class: jni::objects::JClass<'local>,
) -> jni::sys::jboolean {
    if resync_default_output().fully_applied() {
        jni::sys::JNI_TRUE
    } else {
        jni::sys::JNI_FALSE
    }
}
