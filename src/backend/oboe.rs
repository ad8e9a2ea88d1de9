//! Android audio service: `AudioManager` via JNI plus an Oboe output stream.
//!
//! The volume nudge goes through `AudioManager.getStreamVolume` /
//! `setStreamVolume` on `STREAM_MUSIC`; the silent cycle opens a shared
//! 16-bit stereo Oboe stream tagged as media/music so the platform routes it
//! exactly like the app's real playback.

use std::ffi::c_void;

use jni::objects::{GlobalRef, JObject, JValue};
use jni::{JNIEnv, JavaVM};
use oboe::{
    AudioOutputStreamSync, AudioStream, AudioStreamBuilder, AudioStreamSync, ContentType, Output,
    PerformanceMode, SharingMode, Stereo, Usage,
};

use crate::error::{PlaybackStage, ResyncError};
use crate::route::StreamFormat;

use super::{AudioService, InitGate, OutputStream};

/// `android.media.AudioManager.STREAM_MUSIC`
const STREAM_MUSIC: i32 = 3;

/// `Context.AUDIO_SERVICE`
const AUDIO_SERVICE: &str = "audio";

/// Prefill before start must not block on a full device buffer.
const PREFILL_TIMEOUT_NANOS: i64 = 0;

static ANDROID_CONTEXT: InitGate = InitGate::new();

/// Register the application context with `ndk-context`.
///
/// Subsequent calls are ignored. The context global reference is leaked on
/// purpose: `ndk-context` keeps the raw pointer for the process lifetime.
pub fn initialize_android_context(env: &mut JNIEnv, context: &JObject) -> Result<(), ResyncError> {
    if ANDROID_CONTEXT.is_ready() {
        return Ok(());
    }

    let vm = env.get_java_vm().map_err(|e| ResyncError::Jni {
        reason: e.to_string(),
    })?;
    let global = env.new_global_ref(context).map_err(|e| ResyncError::Jni {
        reason: e.to_string(),
    })?;

    if !ANDROID_CONTEXT.claim() {
        return Ok(());
    }

    // SAFETY: both pointers stay valid for the process lifetime; the VM is
    // owned by the Android runtime and the context global ref is leaked below.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut c_void,
            global.as_obj().as_raw() as *mut c_void,
        );
    }
    std::mem::forget(global);
    ANDROID_CONTEXT.mark_ready();

    log::info!("[RouteResync] Android context initialized");
    Ok(())
}

/// Clear a pending Java exception so later JNI calls stay valid.
fn clear_pending_exception(env: &mut JNIEnv) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
    }
}

/// Handle to the platform `AudioManager`.
pub struct AndroidAudioService {
    vm: JavaVM,
    audio_manager: GlobalRef,
}

impl AndroidAudioService {
    /// Look up `AudioManager` through the context registered with `ndk-context`.
    pub fn from_android_context() -> Result<Self, ResyncError> {
        if !ANDROID_CONTEXT.is_ready() {
            return Err(ResyncError::ContextNotInitialized);
        }

        let ctx = ndk_context::android_context();
        // SAFETY: the pointer was registered from a live JavaVM in
        // initialize_android_context.
        let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }.map_err(|e| ResyncError::Jni {
            reason: e.to_string(),
        })?;

        let audio_manager = {
            let mut env = vm.attach_current_thread().map_err(|e| ResyncError::Jni {
                reason: e.to_string(),
            })?;
            // SAFETY: the context is a global reference kept alive for the
            // process lifetime; JObject does not delete it on drop.
            let context = unsafe { JObject::from_raw(ctx.context().cast()) };
            lookup_audio_manager(&mut env, &context)?
        };

        Ok(Self { vm, audio_manager })
    }

    fn with_env<T>(
        &self,
        call: impl FnOnce(&mut JNIEnv) -> jni::errors::Result<T>,
    ) -> Result<T, String> {
        let mut env = self.vm.attach_current_thread().map_err(|e| e.to_string())?;
        call(&mut env).map_err(|e| {
            clear_pending_exception(&mut env);
            e.to_string()
        })
    }
}

fn lookup_audio_manager(env: &mut JNIEnv, context: &JObject) -> Result<GlobalRef, ResyncError> {
    match get_system_service(env, context) {
        Ok(Some(manager)) => Ok(manager),
        Ok(None) => Err(ResyncError::ServiceUnavailable {
            reason: "getSystemService(\"audio\") returned null".to_string(),
        }),
        Err(err) => {
            clear_pending_exception(env);
            Err(ResyncError::ServiceUnavailable {
                reason: err.to_string(),
            })
        }
    }
}

fn get_system_service(
    env: &mut JNIEnv,
    context: &JObject,
) -> jni::errors::Result<Option<GlobalRef>> {
    let service_name = env.new_string(AUDIO_SERVICE)?;
    let manager = env
        .call_method(
            context,
            "getSystemService",
            "(Ljava/lang/String;)Ljava/lang/Object;",
            &[(&service_name).into()],
        )?
        .l()?;
    if manager.is_null() {
        return Ok(None);
    }
    env.new_global_ref(&manager).map(Some)
}

impl AudioService for AndroidAudioService {
    fn media_volume(&self) -> Result<i32, ResyncError> {
        self.with_env(|env| {
            env.call_method(
                &self.audio_manager,
                "getStreamVolume",
                "(I)I",
                &[JValue::Int(STREAM_MUSIC)],
            )?
            .i()
        })
        .map_err(|reason| ResyncError::VolumeQueryFailed { reason })
    }

    fn set_media_volume(&self, level: i32) -> Result<(), ResyncError> {
        self.with_env(|env| {
            env.call_method(
                &self.audio_manager,
                "setStreamVolume",
                "(III)V",
                &[
                    JValue::Int(STREAM_MUSIC),
                    JValue::Int(level),
                    JValue::Int(0),
                ],
            )?
            .v()
        })
        .map_err(|reason| ResyncError::VolumeUpdateFailed { level, reason })
    }

    fn open_output_stream(
        &self,
        format: &StreamFormat,
    ) -> Result<Box<dyn OutputStream + '_>, ResyncError> {
        if format.channels != 2 || format.bits_per_sample != 16 {
            return Err(ResyncError::StreamOpenFailed {
                reason: format!(
                    "Oboe backend opens 16-bit stereo only (requested {} ch, {} bit)",
                    format.channels, format.bits_per_sample
                ),
            });
        }

        let stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::None)
            .set_sharing_mode(SharingMode::Shared)
            .set_direction::<Output>()
            .set_usage(Usage::Media)
            .set_content_type(ContentType::Music)
            .set_sample_rate(format.sample_rate as i32)
            .set_channel_count::<Stereo>()
            .set_format::<i16>()
            .open_stream()
            .map_err(|e| ResyncError::StreamOpenFailed {
                reason: format!("Output stream: {:?}", e),
            })?;

        Ok(Box::new(OboeSilentStream { stream }))
    }
}

/// Oboe closes the stream when it is dropped.
struct OboeSilentStream {
    stream: AudioStreamSync<Output, (i16, Stereo)>,
}

impl OutputStream for OboeSilentStream {
    fn write(&mut self, samples: &[i16]) -> Result<usize, ResyncError> {
        let frames: Vec<(i16, i16)> = samples
            .chunks_exact(2)
            .map(|frame| (frame[0], frame[1]))
            .collect();

        let written = self
            .stream
            .write(&frames, PREFILL_TIMEOUT_NANOS)
            .map_err(|e| ResyncError::PlaybackFailed {
                stage: PlaybackStage::Write,
                reason: format!("{:?}", e),
            })?;

        Ok(written.max(0) as usize * 2)
    }

    fn start(&mut self) -> Result<(), ResyncError> {
        self.stream
            .request_start()
            .map_err(|e| ResyncError::PlaybackFailed {
                stage: PlaybackStage::Start,
                reason: format!("{:?}", e),
            })
    }

    fn stop(&mut self) -> Result<(), ResyncError> {
        self.stream
            .request_stop()
            .map_err(|e| ResyncError::PlaybackFailed {
                stage: PlaybackStage::Stop,
                reason: format!("{:?}", e),
            })
    }
}
