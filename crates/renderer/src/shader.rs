//! The portal effect as a WGSL program, plus reflection of its parameter slots.
//!
//! The program mirrors [`crate::kernel::shade`]. Its parameters live in a
//! single uniform block at `@group(0) @binding(0)`; the captured window is a
//! texture/sampler pair in group 1. [`reflect_bindings`] parses the source with
//! naga and reports where each named parameter lives so the backends can check
//! their upload layout before the first draw.

use std::collections::BTreeMap;

use naga::{AddressSpace, TypeInner};
use thiserror::Error;

/// Scalar and vector parameters every portal program must expose.
pub const UNIFORM_PARAMETERS: [&str; 9] = [
    "rect",
    "viewport",
    "size",
    "seed",
    "progress",
    "duration",
    "color",
    "rotation_speed",
    "whirling",
];

pub const WINDOW_TEXTURE: &str = "window_tex";
pub const WINDOW_SAMPLER: &str = "window_sampler";

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to parse effect program: {0}")]
    Parse(String),
    #[error("effect program is invalid: {0}")]
    Validation(String),
    #[error("effect program has no parameter named '{0}'")]
    MissingBinding(String),
    #[error("parameter '{name}' has the wrong kind (expected {expected})")]
    WrongKind { name: String, expected: &'static str },
}

/// Location of one named program input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSlot {
    /// Member of a uniform block, at `offset` bytes from the block start.
    Uniform { group: u32, binding: u32, offset: u32 },
    Texture { group: u32, binding: u32 },
    Sampler { group: u32, binding: u32 },
}

/// Every named input found in a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    slots: BTreeMap<String, BindingSlot>,
    uniform_size: u32,
}

impl BindingTable {
    pub fn get(&self, name: &str) -> Option<BindingSlot> {
        self.slots.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<BindingSlot, ShaderError> {
        self.get(name)
            .ok_or_else(|| ShaderError::MissingBinding(name.to_string()))
    }

    /// Size in bytes of the uniform block, including trailing padding.
    pub fn uniform_size(&self) -> u32 {
        self.uniform_size
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Resolved locations of the portal program's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlots {
    pub uniform_group: u32,
    pub uniform_binding: u32,
    pub uniform_size: u32,
    /// Byte offsets in the order of [`UNIFORM_PARAMETERS`].
    pub offsets: [u32; UNIFORM_PARAMETERS.len()],
    pub texture: (u32, u32),
    pub sampler: (u32, u32),
}

impl ParameterSlots {
    /// Looks up every parameter the portal effect needs. Any missing name fails.
    pub fn resolve(table: &BindingTable) -> Result<Self, ShaderError> {
        let mut offsets = [0u32; UNIFORM_PARAMETERS.len()];
        let mut block = None;
        for (slot, name) in offsets.iter_mut().zip(UNIFORM_PARAMETERS) {
            match table.require(name)? {
                BindingSlot::Uniform {
                    group,
                    binding,
                    offset,
                } => {
                    *slot = offset;
                    block.get_or_insert((group, binding));
                }
                _ => {
                    return Err(ShaderError::WrongKind {
                        name: name.to_string(),
                        expected: "uniform",
                    })
                }
            }
        }
        let (uniform_group, uniform_binding) =
            block.ok_or_else(|| ShaderError::MissingBinding(UNIFORM_PARAMETERS[0].to_string()))?;

        let texture = match table.require(WINDOW_TEXTURE)? {
            BindingSlot::Texture { group, binding } => (group, binding),
            _ => {
                return Err(ShaderError::WrongKind {
                    name: WINDOW_TEXTURE.to_string(),
                    expected: "texture",
                })
            }
        };
        let sampler = match table.require(WINDOW_SAMPLER)? {
            BindingSlot::Sampler { group, binding } => (group, binding),
            _ => {
                return Err(ShaderError::WrongKind {
                    name: WINDOW_SAMPLER.to_string(),
                    expected: "sampler",
                })
            }
        };

        Ok(Self {
            uniform_group,
            uniform_binding,
            uniform_size: table.uniform_size(),
            offsets,
            texture,
            sampler,
        })
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        UNIFORM_PARAMETERS
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| self.offsets[index])
    }
}

/// Parses and validates a WGSL program without touching a device.
pub fn validate_program(source: &str) -> Result<naga::Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| ShaderError::Parse(err.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|err| ShaderError::Validation(err.emit_to_string(source)))?;
    Ok(module)
}

/// Lists the named inputs of a WGSL program.
///
/// Uniform block members are reported by member name; textures and samplers
/// by variable name.
pub fn reflect_bindings(source: &str) -> Result<BindingTable, ShaderError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| ShaderError::Parse(err.emit_to_string(source)))?;

    let mut table = BindingTable::default();
    for (_, variable) in module.global_variables.iter() {
        let Some(resource) = variable.binding.as_ref() else {
            continue;
        };
        let (group, binding) = (resource.group, resource.binding);
        let ty = &module.types[variable.ty];
        match (variable.space, &ty.inner) {
            (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                table.uniform_size = *span;
                for member in members {
                    if let Some(name) = member.name.as_ref() {
                        table.slots.insert(
                            name.clone(),
                            BindingSlot::Uniform {
                                group,
                                binding,
                                offset: member.offset,
                            },
                        );
                    }
                }
            }
            (AddressSpace::Handle, TypeInner::Image { .. }) => {
                if let Some(name) = variable.name.as_ref() {
                    table
                        .slots
                        .insert(name.clone(), BindingSlot::Texture { group, binding });
                }
            }
            (AddressSpace::Handle, TypeInner::Sampler { .. }) => {
                if let Some(name) = variable.name.as_ref() {
                    table
                        .slots
                        .insert(name.clone(), BindingSlot::Sampler { group, binding });
                }
            }
            _ => {}
        }
    }
    Ok(table)
}

/// WGSL source of the portal effect.
pub const PORTAL_SHADER_WGSL: &str = r#"
struct PortalParams {
    rect: vec4<f32>,
    viewport: vec2<f32>,
    size: vec2<f32>,
    seed: vec2<f32>,
    progress: f32,
    duration: f32,
    color: vec3<f32>,
    rotation_speed: f32,
    whirling: f32,
};

@group(0) @binding(0) var<uniform> params: PortalParams;
@group(1) @binding(0) var window_tex: texture_2d<f32>;
@group(1) @binding(1) var window_sampler: sampler;

const PORTAL_WOBBLE_TIME: f32 = 0.8;
const PORTAL_WOBBLE_STRENGTH: f32 = 1.2;
const GLOW_EDGE_WIDTH: f32 = 5.0;
const WINDOW_SCALE: f32 = 0.3;
const WINDOW_SQUISH: f32 = 1.0;
const WINDOW_TILT: f32 = -1.0;
const PORTAL_OPEN_TIME: f32 = 0.4;
const PORTAL_CLOSE_TIME: f32 = 0.4;
const WINDOW_OPEN_TIME: f32 = 0.35;

struct VertexIn {
    @location(0) position: vec2<f32>,
    @location(1) tex_coord: vec2<f32>,
};

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(input: VertexIn) -> VertexOut {
    let pixel = params.rect.xy + input.position * params.rect.zw;
    let ndc = pixel / params.viewport * 2.0 - vec2<f32>(1.0, 1.0);
    var out: VertexOut;
    out.clip = vec4<f32>(ndc.x, -ndc.y, 0.0, 1.0);
    out.uv = input.tex_coord;
    return out;
}

fn mod289_3(x: vec3<f32>) -> vec3<f32> {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn mod289_2(x: vec2<f32>) -> vec2<f32> {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn permute(x: vec3<f32>) -> vec3<f32> {
    return mod289_3(((x * 34.0) + 1.0) * x);
}

fn simplex2d(v: vec2<f32>) -> f32 {
    let c = vec4<f32>(0.211324865405187, 0.366025403784439, -0.577350269189626, 0.024390243902439);
    var i = floor(v + dot(v, c.yy));
    let x0 = v - i + dot(i, c.xx);
    var i1 = vec2<f32>(0.0, 1.0);
    if (x0.x > x0.y) {
        i1 = vec2<f32>(1.0, 0.0);
    }
    let x12_base = x0.xyxy + c.xxzz;
    let x12 = vec4<f32>(x12_base.xy - i1, x12_base.zw);
    i = mod289_2(i);
    let p = permute(permute(i.y + vec3<f32>(0.0, i1.y, 1.0)) + i.x + vec3<f32>(0.0, i1.x, 1.0));
    var m = max(vec3<f32>(0.5) - vec3<f32>(dot(x0, x0), dot(x12.xy, x12.xy), dot(x12.zw, x12.zw)), vec3<f32>(0.0));
    m = m * m;
    m = m * m;
    let gx = 2.0 * fract(p * c.www) - 1.0;
    let h = abs(gx) - 0.5;
    let a0 = gx - floor(gx + 0.5);
    m = m * (1.79284291400159 - 0.85373472095314 * (a0 * a0 + h * h));
    let g = vec3<f32>(a0.x * x0.x + h.x * x0.y, a0.yz * x12.xz + h.yz * x12.yw);
    return 130.0 * dot(m, g);
}

fn ease_in_back(x: f32, s: f32) -> f32 {
    return (s + 1.0) * x * x * x - s * x * x;
}

fn ease_out_back(x: f32, s: f32) -> f32 {
    let t = x - 1.0;
    return 1.0 + (s + 1.0) * t * t * t + s * t * t;
}

fn darken(color: vec3<f32>, amount: f32) -> vec3<f32> {
    return color * (1.0 - amount);
}

fn lighten(color: vec3<f32>, amount: f32) -> vec3<f32> {
    return color + (vec3<f32>(1.0) - color) * amount;
}

fn alpha_over(background: vec4<f32>, foreground: vec4<f32>) -> vec4<f32> {
    let alpha = foreground.a + background.a * (1.0 - foreground.a);
    let rgb = (foreground.rgb * foreground.a + background.rgb * background.a * (1.0 - foreground.a)) / max(alpha, 0.001);
    return vec4<f32>(rgb, alpha);
}

fn whirl(coords: vec2<f32>, warping: f32, rotation: f32) -> vec2<f32> {
    let dist = length(coords);
    let angle = atan2(coords.y, coords.x) + rotation + warping * exp(-dist);
    return vec2<f32>(cos(angle), sin(angle)) * dist;
}

fn portal_scale() -> f32 {
    if (params.progress < PORTAL_OPEN_TIME) {
        return ease_out_back(params.progress / PORTAL_OPEN_TIME, 1.5);
    }
    if (params.progress > 1.0 - PORTAL_CLOSE_TIME) {
        return ease_out_back(1.0 - (params.progress - 1.0 + PORTAL_CLOSE_TIME) / PORTAL_CLOSE_TIME, 1.5);
    }
    return 1.0;
}

fn portal_wobble(coords: vec2<f32>) -> vec2<f32> {
    let t = params.progress / WINDOW_OPEN_TIME;
    let pulse = ease_in_back(clamp(1.0 - abs((t - 1.0) / PORTAL_WOBBLE_TIME), 0.0, 1.0), 1.7);
    let dist = length(coords);
    return coords * (1.0 - dist) * exp(-dist) * pulse * PORTAL_WOBBLE_STRENGTH;
}

fn random_displace(coords: vec2<f32>, scale: f32) -> vec2<f32> {
    let base = coords * scale + params.seed;
    return vec2<f32>(simplex2d(base) - 0.5, simplex2d(base + vec2<f32>(7.89, 123.0)) - 0.5);
}

fn whirled(coords: vec2<f32>, speed: f32, warp: f32) -> vec2<f32> {
    let rotation = params.rotation_speed * params.progress * params.duration * speed;
    let warping = params.whirling * (6.0 + 1.5 * params.progress) * warp;
    return whirl(coords, warping, rotation);
}

fn portal_color(uv: vec2<f32>) -> vec4<f32> {
    var coords = (uv - vec2<f32>(0.5)) * 2.0 * 1.5;
    let scale = portal_scale();
    coords = coords / max(scale * 0.5 + 0.5, 0.01);

    let wobble = portal_wobble(coords);
    let detail = 10000.0 / max(params.size.x + params.size.y, 1.0) * 0.5;

    var layer_coords = whirled(coords - wobble, 0.25, 1.0);
    var displace = random_displace(layer_coords, 2.1);
    layer_coords = layer_coords + displace * 0.1;
    let dist = length(layer_coords);
    let alpha = select(1.0, 0.0, dist > 1.0);
    var color = vec4<f32>(mix(darken(params.color, 0.8), darken(params.color, 0.2), pow(dist, 5.0)), alpha);
    let rand_val = dot(displace, displace);

    var noise = simplex2d(layer_coords / detail + vec2<f32>(12.3, 56.4) + params.seed);
    color = alpha_over(color, vec4<f32>(darken(params.color, 0.3), select(0.0, alpha, noise > 0.6)));

    layer_coords = whirled(coords - wobble * 1.5, 0.75, 0.5);
    displace = random_displace(layer_coords, 12.2);
    layer_coords = layer_coords + displace * 0.1;
    noise = simplex2d(layer_coords / detail * 1.3 + params.seed);
    color = alpha_over(color, vec4<f32>(params.color, select(0.0, alpha, noise > 0.6)));

    color = clamp(color, vec4<f32>(0.0), vec4<f32>(1.0));

    let edge = mix(1.0, 5.0, rand_val) * GLOW_EDGE_WIDTH * detail - 150.0 * abs(dist - 1.0);
    color = alpha_over(color, vec4<f32>(params.color, clamp(edge, 0.0, 1.0)));

    layer_coords = whirled(coords - wobble * 1.8, 1.25, 0.0);
    noise = simplex2d(layer_coords / detail * 3.0 + params.seed);
    let sparkle = clamp(pow(max(noise * rand_val + 0.9, 0.0), 50.0), 0.0, 1.0);
    color = vec4<f32>(color.rgb + lighten(params.color, 0.8) * sparkle, color.a);

    let envelope = clamp(scale, 0.0, 1.0);
    color.a = color.a * envelope * envelope;
    return clamp(color, vec4<f32>(0.0), vec4<f32>(1.0));
}

fn window_color(uv: vec2<f32>) -> vec4<f32> {
    let pull = ease_in_back(clamp(params.progress / WINDOW_OPEN_TIME, 0.0, 1.0), 1.2);

    var coords = uv * 2.0 - vec2<f32>(1.0);
    coords = coords / mix(1.0, WINDOW_SCALE, pull);
    coords.y = coords.y / mix(1.0, 1.0 - 0.2 * WINDOW_SQUISH, pull);
    coords.x = coords.x / mix(1.0, 1.0 - 0.1 * WINDOW_TILT * coords.y, pull);
    coords = coords * 0.5 + vec2<f32>(0.5);

    if (coords.x < 0.0 || coords.x > 1.0 || coords.y < 0.0 || coords.y > 1.0) {
        return vec4<f32>(0.0);
    }

    var texel = textureSampleLevel(window_tex, window_sampler, coords, 0.0);
    texel.a = texel.a * clamp((1.0 - pull) * 3.0, 0.0, 1.0);
    return texel;
}

@fragment
fn fs_main(input: VertexOut) -> @location(0) vec4<f32> {
    let color = alpha_over(portal_color(input.uv), window_color(input.uv));
    return vec4<f32>(color.rgb * color.a, color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_program_validates() {
        let module = validate_program(PORTAL_SHADER_WGSL).unwrap();
        let entries: Vec<_> = module
            .entry_points
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert!(entries.contains(&VERTEX_ENTRY));
        assert!(entries.contains(&FRAGMENT_ENTRY));
    }

    #[test]
    fn reflection_finds_every_parameter() {
        let table = reflect_bindings(PORTAL_SHADER_WGSL).unwrap();
        let slots = ParameterSlots::resolve(&table).unwrap();
        assert_eq!((slots.uniform_group, slots.uniform_binding), (0, 0));
        assert_eq!(slots.texture, (1, 0));
        assert_eq!(slots.sampler, (1, 1));
        assert_eq!(slots.offset_of("rect"), Some(0));
        assert_eq!(slots.offset_of("viewport"), Some(16));
        assert_eq!(slots.offset_of("color"), Some(48));
        assert_eq!(slots.offset_of("whirling"), Some(64));
        assert_eq!(slots.uniform_size, 80);
        assert_eq!(slots.offset_of("missing"), None);
    }

    #[test]
    fn missing_parameter_is_reported_by_name() {
        let source = r#"
struct Params { progress: f32 };
@group(0) @binding(0) var<uniform> params: Params;
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(params.progress);
}
"#;
        let table = reflect_bindings(source).unwrap();
        assert!(matches!(
            table.get("progress"),
            Some(BindingSlot::Uniform { offset: 0, .. })
        ));
        match ParameterSlots::resolve(&table) {
            Err(ShaderError::MissingBinding(name)) => assert_eq!(name, "rect"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn malformed_source_fails_to_parse() {
        let err = reflect_bindings("fn broken( {").unwrap_err();
        assert!(matches!(err, ShaderError::Parse(_)));
        assert!(validate_program("fn broken( {").is_err());
    }
}
