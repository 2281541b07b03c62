//! SOAP operations of the PTZ service and its dispatcher registration.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::ptz::presets::{MAX_PRESETS_PER_PROFILE, Preset};
use crate::ptz::service::{PanTilt, PtzService};
use crate::service::ServiceRegistration;
use crate::soap::{self, element_attr, element_inner, element_text, xml_escape};

pub const SERVICE_NAME: &str = "ptz";

const POSITION_SPACE: &str = "http://www.onvif.org/ver10/tptz/PanTiltSpaces/PositionGenericSpace";
const TRANSLATION_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/PanTiltSpaces/TranslationGenericSpace";
const VELOCITY_SPACE: &str = "http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace";
const SPEED_SPACE: &str = "http://www.onvif.org/ver10/tptz/PanTiltSpaces/GenericSpeedSpace";

type Operation = fn(&PtzService, &str) -> Result<String>;

const OPERATIONS: &[(&str, Operation)] = &[
    ("GetNodes", get_nodes),
    ("GetServiceCapabilities", get_service_capabilities),
    ("GetStatus", get_status),
    ("AbsoluteMove", absolute_move),
    ("RelativeMove", relative_move),
    ("ContinuousMove", continuous_move),
    ("Stop", stop),
    ("GotoHomePosition", goto_home),
    ("SetHomePosition", set_home),
    ("GetPresets", get_presets),
    ("SetPreset", set_preset),
    ("GotoPreset", goto_preset),
    ("RemovePreset", remove_preset),
];

/// Capabilities answered through the dispatcher's capability hook.
pub fn capability(name: &str) -> bool {
    matches!(name, "MoveStatus" | "StatusPosition")
}

/// Names of every operation the PTZ service answers.
pub fn operations() -> impl Iterator<Item = &'static str> {
    OPERATIONS.iter().map(|(name, _)| *name)
}

pub fn registration(service: Arc<PtzService>) -> ServiceRegistration {
    ServiceRegistration::new(SERVICE_NAME, move |operation, request| {
        handle(&service, operation, request)
    })
    .with_init(|| {
        tracing::info!(operations = OPERATIONS.len(), "PTZ service ready");
        Ok(())
    })
    .with_cleanup(|| tracing::info!("PTZ service stopped"))
    .with_capabilities(capability)
}

/// Runs `operation` against the request body and wraps the result in an
/// envelope.
pub fn handle(service: &PtzService, operation: &str, request: &Request) -> Result<Response> {
    let (_, op) = OPERATIONS
        .iter()
        .find(|(name, _)| *name == operation)
        .ok_or_else(|| Error::NotFound(format!("PTZ operation '{}'", operation)))?;

    let body = std::str::from_utf8(&request.body)
        .map_err(|_| Error::ParseFailure("request body is not UTF-8".to_string()))?;

    let payload = op(service, body)?;
    Ok(Response::ok(soap::SOAP_CONTENT_TYPE, soap::envelope(&payload)))
}

fn required_text(xml: &str, name: &str) -> Result<String> {
    element_text(xml, name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::InvalidArgument(format!("{} missing", name)))
}

fn profile_token(body: &str) -> Result<String> {
    required_text(body, "ProfileToken")
}

fn parse_coord(value: Option<String>, what: &str) -> Result<Option<f32>> {
    value
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|_| Error::InvalidArgument(format!("{} is not a number", what)))
        })
        .transpose()
}

/// Reads `<…:PanTilt x=".." y=".."/>` inside `container`.
fn pan_tilt(body: &str, container: &str) -> Result<Option<PanTilt>> {
    let Some(inner) = element_inner(body, container) else {
        return Ok(None);
    };
    let x = parse_coord(element_attr(inner, "PanTilt", "x"), "x")?;
    let y = parse_coord(element_attr(inner, "PanTilt", "y"), "y")?;
    match (x, y) {
        (Some(x), Some(y)) => Ok(Some(PanTilt::new(x, y))),
        (None, None) => Ok(None),
        _ => Err(Error::InvalidArgument(format!("{} needs both x and y", container))),
    }
}

fn required_pan_tilt(body: &str, container: &str) -> Result<PanTilt> {
    pan_tilt(body, container)?
        .ok_or_else(|| Error::InvalidArgument(format!("{} missing", container)))
}

/// Single speed magnitude from the optional `Speed` vector.
fn speed(body: &str) -> Result<Option<f32>> {
    Ok(pan_tilt(body, "Speed")?.map(|s| s.x.abs().max(s.y.abs())))
}

fn flag(body: &str, name: &str, default: bool) -> Result<bool> {
    match element_text(body, name) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(_) => Err(Error::InvalidArgument(format!("{} must be a boolean", name))),
    }
}

fn get_nodes(_: &PtzService, _: &str) -> Result<String> {
    Ok(format!(
        concat!(
            "<tptz:GetNodesResponse>",
            "<tptz:PTZNode token=\"PTZNode0\" FixedHomePosition=\"true\">",
            "<tt:Name>PTZ Node</tt:Name>",
            "<tt:SupportedPTZSpaces>",
            "<tt:AbsolutePanTiltPositionSpace><tt:URI>{}</tt:URI>",
            "<tt:XRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:XRange>",
            "<tt:YRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:YRange>",
            "</tt:AbsolutePanTiltPositionSpace>",
            "<tt:RelativePanTiltTranslationSpace><tt:URI>{}</tt:URI>",
            "<tt:XRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:XRange>",
            "<tt:YRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:YRange>",
            "</tt:RelativePanTiltTranslationSpace>",
            "<tt:ContinuousPanTiltVelocitySpace><tt:URI>{}</tt:URI>",
            "<tt:XRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:XRange>",
            "<tt:YRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:YRange>",
            "</tt:ContinuousPanTiltVelocitySpace>",
            "<tt:PanTiltSpeedSpace><tt:URI>{}</tt:URI>",
            "<tt:XRange><tt:Min>0</tt:Min><tt:Max>1</tt:Max></tt:XRange>",
            "</tt:PanTiltSpeedSpace>",
            "</tt:SupportedPTZSpaces>",
            "<tt:MaximumNumberOfPresets>{}</tt:MaximumNumberOfPresets>",
            "<tt:HomeSupported>true</tt:HomeSupported>",
            "</tptz:PTZNode>",
            "</tptz:GetNodesResponse>"
        ),
        POSITION_SPACE, TRANSLATION_SPACE, VELOCITY_SPACE, SPEED_SPACE, MAX_PRESETS_PER_PROFILE
    ))
}

fn get_service_capabilities(_: &PtzService, _: &str) -> Result<String> {
    Ok(format!(
        "<tptz:GetServiceCapabilitiesResponse><tptz:Capabilities MoveStatus=\"{}\" StatusPosition=\"{}\"/></tptz:GetServiceCapabilitiesResponse>",
        capability("MoveStatus"),
        capability("StatusPosition")
    ))
}

fn get_status(service: &PtzService, body: &str) -> Result<String> {
    let status = service.get_status(&profile_token(body)?)?;
    Ok(format!(
        concat!(
            "<tptz:GetStatusResponse><tptz:PTZStatus>",
            "<tt:Position><tt:PanTilt x=\"{}\" y=\"{}\" space=\"{}\"/></tt:Position>",
            "<tt:MoveStatus><tt:PanTilt>{}</tt:PanTilt><tt:Zoom>IDLE</tt:Zoom></tt:MoveStatus>",
            "</tptz:PTZStatus></tptz:GetStatusResponse>"
        ),
        status.position.x,
        status.position.y,
        POSITION_SPACE,
        status.pan_tilt().as_str()
    ))
}

fn absolute_move(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let position = required_pan_tilt(body, "Position")?;
    service.absolute_move(&profile, position, speed(body)?)?;
    Ok("<tptz:AbsoluteMoveResponse/>".to_string())
}

fn relative_move(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let translation = required_pan_tilt(body, "Translation")?;
    service.relative_move(&profile, translation, speed(body)?)?;
    Ok("<tptz:RelativeMoveResponse/>".to_string())
}

fn continuous_move(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let velocity = required_pan_tilt(body, "Velocity")?;
    let timeout_ms = match element_text(body, "Timeout") {
        Some(t) => soap::parse_duration_ms(&t)
            .ok_or_else(|| Error::InvalidArgument("Timeout is not a duration".to_string()))?,
        None => 0,
    };
    service.continuous_move(&profile, velocity, timeout_ms)?;
    Ok("<tptz:ContinuousMoveResponse/>".to_string())
}

fn stop(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let pan_tilt = flag(body, "PanTilt", true)?;
    let zoom = flag(body, "Zoom", true)?;
    service.stop(&profile, pan_tilt, zoom)?;
    Ok("<tptz:StopResponse/>".to_string())
}

fn goto_home(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    service.goto_home(&profile, speed(body)?)?;
    Ok("<tptz:GotoHomePositionResponse/>".to_string())
}

fn set_home(service: &PtzService, body: &str) -> Result<String> {
    service.set_home(&profile_token(body)?)?;
    Ok("<tptz:SetHomePositionResponse/>".to_string())
}

fn render_preset(preset: &Preset) -> String {
    format!(
        concat!(
            "<tptz:Preset token=\"{}\"><tt:Name>{}</tt:Name>",
            "<tt:PTZPosition><tt:PanTilt x=\"{}\" y=\"{}\" space=\"{}\"/></tt:PTZPosition>",
            "</tptz:Preset>"
        ),
        xml_escape(&preset.token),
        xml_escape(&preset.name),
        preset.pan,
        preset.tilt,
        POSITION_SPACE
    )
}

fn get_presets(service: &PtzService, body: &str) -> Result<String> {
    let presets = service.get_presets(&profile_token(body)?)?;
    let mut out = String::from("<tptz:GetPresetsResponse>");
    for preset in &presets {
        out.push_str(&render_preset(preset));
    }
    out.push_str("</tptz:GetPresetsResponse>");
    Ok(out)
}

fn set_preset(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let name = element_text(body, "PresetName").filter(|n| !n.is_empty());
    let token = element_text(body, "PresetToken").filter(|t| !t.is_empty());
    let assigned = service.set_preset(&profile, name.as_deref(), token.as_deref())?;
    Ok(format!(
        "<tptz:SetPresetResponse><tptz:PresetToken>{}</tptz:PresetToken></tptz:SetPresetResponse>",
        xml_escape(&assigned)
    ))
}

fn goto_preset(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let token = required_text(body, "PresetToken")?;
    service.goto_preset(&profile, &token, speed(body)?)?;
    Ok("<tptz:GotoPresetResponse/>".to_string())
}

fn remove_preset(service: &PtzService, body: &str) -> Result<String> {
    let profile = profile_token(body)?;
    let token = required_text(body, "PresetToken")?;
    service.remove_preset(&profile, &token)?;
    Ok("<tptz:RemovePresetResponse/>".to_string())
}
