use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsValue, NativeFunction};
use uuid::Uuid;

/// Global names installed by [`register_all`].
pub const NATIVE_GLOBALS: &[&str] = &["btoa", "atob", "uuidv4"];

/// Register the host-implemented helpers into a fresh context.
pub fn register_all(context: &mut Context) -> JsResult<()> {
    register_fn(context, "btoa", 1, base64_btoa)?;
    register_fn(context, "atob", 1, base64_atob)?;
    register_fn(context, "uuidv4", 0, uuid_v4)?;
    Ok(())
}

fn register_fn(
    context: &mut Context,
    name: &str,
    length: usize,
    f: fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>,
) -> JsResult<()> {
    let function = FunctionObjectBuilder::new(context.realm(), NativeFunction::from_fn_ptr(f))
        .name(js_string!(name))
        .length(length)
        .constructor(false)
        .build();
    context.register_global_property(js_string!(name), function, Attribute::all())
}

fn base64_btoa(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let input = js_arg_to_string(args.first());
    Ok(JsValue::from(js_string!(BASE64_STANDARD.encode(input.as_bytes()))))
}

fn base64_atob(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let input = js_arg_to_string(args.first());
    let decoded = BASE64_STANDARD
        .decode(input.as_bytes())
        .map_err(|_| JsNativeError::typ().with_message("Invalid base64 input"))?;
    let s = String::from_utf8(decoded)
        .map_err(|_| JsNativeError::typ().with_message("Invalid UTF-8 string"))?;
    Ok(JsValue::from(js_string!(s)))
}

fn uuid_v4(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(js_string!(Uuid::new_v4().to_string())))
}

fn js_arg_to_string(arg: Option<&JsValue>) -> String {
    arg.and_then(|v| v.as_string())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default()
}
