//! GLSL for the batch program and the four defect classes.
//!
//! The software backend only reads the `SHADER_NAME` define and the uniform declarations; the
//! bodies are kept realistic so the same sources link on a real GL context.

use visbug::{BugCatalog, BugClass, BugDescriptor};

const VERTEX_TEMPLATE: &str = r#"
#define SHADER_NAME {name}
precision highp float;

attribute vec2 aVertexPosition;
attribute vec2 aTextureCoord;
attribute vec4 aColor;
attribute float aTextureId;

uniform mat3 projectionMatrix;
uniform mat3 translationMatrix;
uniform vec4 tint;

varying vec2 vTextureCoord;
varying vec4 vColor;
varying float vTextureId;

void main(void) {
    vec3 position = projectionMatrix * translationMatrix * vec3(aVertexPosition, 1.0);
    gl_Position = vec4(position.xy, 0.0, {w});
    vTextureCoord = aTextureCoord;
    vTextureId = aTextureId;
    vColor = aColor * tint;
}
"#;

const FRAGMENT_TEMPLATE: &str = r#"
#define SHADER_NAME {name}
precision mediump float;

varying vec2 vTextureCoord;
varying vec4 vColor;
varying float vTextureId;

uniform sampler2D uSamplers[16];

void main(void) {
    vec4 color = texture2D(uSamplers[0], vTextureCoord) * vColor;
    {body}
}
"#;

fn vertex(name: &str, w: &str) -> String {
    VERTEX_TEMPLATE.replace("{name}", name).replace("{w}", w)
}

fn fragment(name: &str, body: &str) -> String {
    FRAGMENT_TEMPLATE
        .replace("{name}", name)
        .replace("{body}", body)
}

pub const DEFAULT_VERTEX: &str = r#"
#define SHADER_NAME default
precision highp float;

attribute vec2 aVertexPosition;
attribute vec2 aTextureCoord;
attribute vec4 aColor;
attribute float aTextureId;

uniform mat3 projectionMatrix;
uniform mat3 translationMatrix;
uniform vec4 tint;

varying vec2 vTextureCoord;
varying vec4 vColor;
varying float vTextureId;

void main(void) {
    gl_Position = vec4((projectionMatrix * translationMatrix * vec3(aVertexPosition, 1.0)).xy, 0.0, 1.0);
    vTextureCoord = aTextureCoord;
    vTextureId = aTextureId;
    vColor = aColor * tint;
}
"#;

pub const DEFAULT_FRAGMENT: &str = r#"
#define SHADER_NAME default
precision mediump float;

varying vec2 vTextureCoord;
varying vec4 vColor;
varying float vTextureId;

uniform sampler2D uSamplers[16];

void main(void) {
    gl_FragColor = texture2D(uSamplers[0], vTextureCoord) * vColor;
}
"#;

/// A fragment stage with no entry point. Fails to build.
pub const BROKEN_FRAGMENT: &str = r#"
#define SHADER_NAME appearance
precision mediump float;
uniform sampler2D uSamplers[16];
"#;

pub fn descriptor(class: BugClass) -> BugDescriptor {
    let name = class.as_str();
    let (w, body) = match class {
        BugClass::Appearance => ("1.0", "gl_FragColor = vec4(color.a - color.rgb, color.a);"),
        BugClass::Layout => ("2.0", "gl_FragColor = color;"),
        BugClass::Rendering => (
            "1.0",
            "if (mod(floor(gl_FragCoord.y), 2.0) > 0.5) discard; gl_FragColor = color;",
        ),
        BugClass::State | BugClass::None => (
            "1.0",
            "float grey = dot(color.rgb, vec3(0.299, 0.587, 0.114)); gl_FragColor = vec4(vec3(grey), color.a);",
        ),
    };
    BugDescriptor::new(class, vertex(name, w), fragment(name, body))
}

/// A catalog with a program for every defect class.
pub fn full_catalog() -> BugCatalog {
    let mut catalog = BugCatalog::default();
    for class in BugClass::ALL {
        if class.is_none() {
            continue;
        }
        catalog
            .register(descriptor(class))
            .expect("bundled defect program declares the batch attributes");
    }
    catalog
}
