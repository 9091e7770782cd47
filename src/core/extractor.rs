use crate::common::{Config, FaceBankError, Result};
use crate::core::quality::RegionQuality;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A face descriptor as stored and compared: 128 values from the reference
/// embedding model.
pub type Descriptor = Vec<f64>;

pub const DESCRIPTOR_LEN: usize = 128;

/// Most faces kept from a single image after filtering.
const MAX_FACES: usize = 5;

/// Turns a captured image into face descriptors. Implementations run behind
/// the flows; the service shares one instance across connections.
pub trait DescriptorExtractor: Send + Sync {
    /// One descriptor per detected face, empty when the image contains none.
    /// An error is an infrastructure fault, never "no face".
    fn extract(&self, image: &DynamicImage) -> Result<Vec<Descriptor>>;

    /// Coarse check that a usable face is present. Advisory: extraction stays
    /// authoritative.
    fn detect_presence(&self, image: &DynamicImage) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// ONNX-backed extractor: a YOLO-style face detector feeding an embedding
/// network, both loaded once at construction.
pub struct OnnxExtractor {
    detector: Session,
    recognizer: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl OnnxExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("facebank")
                .build()
                .map_err(|e| FaceBankError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let detector = build_session(
            &environment,
            &config.models.detector_path,
            config.models.optimization_level,
        )?;
        let recognizer = build_session(
            &environment,
            &config.models.recognizer_path,
            config.models.optimization_level,
        )?;

        Ok(Self {
            detector,
            recognizer,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let input_width = self.config.detector.input_width;
        let input_height = self.config.detector.input_height;

        let img_array = if image.width() == input_width && image.height() == input_height {
            self.image_to_detector_array(image)
        } else {
            let resized = image.resize_exact(input_width, input_height, FilterType::Triangle);
            self.image_to_detector_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.detector.allocator(), &cow_array)?;
        let outputs = self.detector.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        // Back into original image coordinates
        let scale_x = orig_width / input_width as f32;
        let scale_y = orig_height / input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }

    fn image_to_detector_array(&self, img: &DynamicImage) -> Array4<f32> {
        let gray = img.to_luma8();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let raw = gray.as_raw();

        // The detector expects three identical channels normalized to 0..1
        let mut array = Array4::<f32>::zeros((1, 3, height, width));
        for y in 0..height {
            let row_offset = y * width;
            for x in 0..width {
                let value = raw[row_offset + x] as f32 / 255.0;
                array[[0, 0, y, x]] = value;
                array[[0, 1, y, x]] = value;
                array[[0, 2, y, x]] = value;
            }
        }
        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| FaceBankError::Model("Detector returned no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned();
        let shape = output.shape().to_vec();
        let data = output
            .as_slice()
            .ok_or_else(|| FaceBankError::Model("Detector output is not contiguous".into()))?;

        // YOLO-style head: [1, N, 5] or the transposed [1, 5, N]
        let (num_predictions, prediction_length, is_transposed) = if shape.len() >= 3 {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        } else if shape.len() == 2 {
            (shape[0], shape[1], false)
        } else {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Ok(Vec::new());
        };

        let input_width = self.config.detector.input_width as f32;
        let input_height = self.config.detector.input_height as f32;
        let mut boxes = Vec::new();

        for i in 0..num_predictions {
            let value_at = |field: usize| {
                if is_transposed {
                    data[field * num_predictions + i]
                } else {
                    data[i * prediction_length + field]
                }
            };

            let confidence = if prediction_length > 4 { value_at(4) } else { 0.0 };
            if confidence <= 0.001 {
                continue;
            }

            let x_center_raw = value_at(0);
            let y_center_raw = value_at(1);
            let width_raw = value_at(2);
            let height_raw = value_at(3);

            // Some exports emit normalized coordinates, others pixel space
            let scale = if x_center_raw > 1.0 || y_center_raw > 1.0 || width_raw > 1.0 || height_raw > 1.0
            {
                1.0
            } else {
                input_width
            };

            let x_center = x_center_raw * scale;
            let y_center = y_center_raw * scale;
            let width = width_raw * scale;
            let height = height_raw * scale;

            let x1 = (x_center - width / 2.0).max(0.0);
            let y1 = (y_center - height / 2.0).max(0.0);
            let x2 = (x_center + width / 2.0).min(input_width);
            let y2 = (y_center + height / 2.0).min(input_height);

            // Drop inverted and sliver boxes
            if x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
                boxes.push(FaceBox {
                    x1,
                    y1,
                    x2,
                    y2,
                    confidence,
                });
            }
        }

        // NMS before the confidence cut so duplicates of a strong detection
        // cannot survive as separate faces
        let mut boxes = apply_nms(boxes, self.config.detector.nms_threshold);
        boxes.retain(|b| b.confidence >= self.config.detector.confidence_threshold);
        boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        boxes.truncate(MAX_FACES);

        Ok(boxes)
    }

    fn embed(&self, image: &DynamicImage, face: &FaceBox) -> Result<Descriptor> {
        let face_img = crop_face(image, face);
        let input_size = self.config.recognizer.input_size;
        let resized = face_img.resize_exact(input_size, input_size, FilterType::Triangle);

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.recognizer.allocator(), &cow_array)?;

        let outputs = self.recognizer.run(vec![input_tensor])?;
        let raw = outputs
            .first()
            .ok_or_else(|| FaceBankError::Model("Recognizer returned no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned()
            .into_raw_vec();

        if raw.len() != DESCRIPTOR_LEN {
            return Err(FaceBankError::Model(format!(
                "Recognizer produced {} values, expected {}",
                raw.len(),
                DESCRIPTOR_LEN
            )));
        }

        let descriptor: Descriptor = raw.iter().map(|&v| v as f64).collect();
        if descriptor.iter().any(|v| !v.is_finite()) {
            return Err(FaceBankError::Model(
                "Recognizer produced non-finite values".into(),
            ));
        }

        Ok(descriptor)
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        let gray = img.to_luma8();
        let size = self.config.recognizer.input_size as usize;
        let norm = self.config.recognizer.normalization_value;

        let mut array = Array4::<f32>::zeros((1, 1, size, size));
        for y in 0..size {
            for x in 0..size {
                let pixel = gray.get_pixel(x as u32, y as u32);
                array[[0, 0, y, x]] = (pixel[0] as f32 - norm) / norm;
            }
        }
        array
    }
}

impl DescriptorExtractor for OnnxExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<Descriptor>> {
        let faces = self.detect_faces(image)?;
        faces.iter().map(|face| self.embed(image, face)).collect()
    }

    fn detect_presence(&self, image: &DynamicImage) -> Result<bool> {
        let faces = self.detect_faces(image)?;
        let best = match faces.first() {
            Some(face) => face,
            None => return Ok(false),
        };
        let quality = RegionQuality::measure(image, best);
        Ok(quality.is_usable(
            self.config.extraction.min_brightness,
            self.config.extraction.min_contrast,
        ))
    }
}

fn build_session(
    environment: &Arc<Environment>,
    model_path: &Path,
    optimization_level: u32,
) -> Result<Session> {
    if !model_path.exists() {
        return Err(FaceBankError::Model(format!(
            "Model not found at: {:?}",
            model_path
        )));
    }

    let opt_level = match optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };

    let session = SessionBuilder::new(environment)?
        .with_optimization_level(opt_level)?
        .with_model_from_file(model_path)?;
    Ok(session)
}

fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    let width = (face.x2 - face.x1).max(1.0) as u32;
    let height = (face.y2 - face.y1).max(1.0) as u32;
    image.crop_imm(x, y, width, height)
}

fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Runs extraction on a worker thread and gives up after a fixed timeout, so
/// a wedged model call cannot hold a connection open forever. When the
/// deadline passes the worker is left to finish on its own and its result is
/// dropped.
pub struct BoundedExtractor {
    inner: Arc<dyn DescriptorExtractor>,
    timeout: Duration,
}

impl BoundedExtractor {
    pub fn new(inner: Arc<dyn DescriptorExtractor>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl DescriptorExtractor for BoundedExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<Descriptor>> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let image = image.clone();
        thread::spawn(move || {
            let _ = tx.send(inner.extract(&image));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(FaceBankError::ExtractionTimeout(
                self.timeout.as_millis() as u64
            )),
        }
    }

    fn detect_presence(&self, image: &DynamicImage) -> Result<bool> {
        self.inner.detect_presence(image)
    }
}
