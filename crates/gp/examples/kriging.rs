use linfa::prelude::*;
use ndarray::{Array, Axis, arr1, arr2};
use skipgp_gp::Kriging;

fn main() {
    let xtrain = arr2(&[[0.0], [1.0], [2.0], [3.0], [4.0]]);
    let ytrain = arr1(&[0.0, 1.0, 1.5, 0.9, 1.0]);

    let kriging = Kriging::params()
        .n_iter(100)
        .fit(&Dataset::new(xtrain, ytrain))
        .expect("Kriging fitting");
    println!("{kriging}");

    let xtest = Array::linspace(0., 4., 100).insert_axis(Axis(1));
    let (ytest, yvar) = kriging.predict_valvar(&xtest).expect("Kriging prediction");
    println!("y(2.5) = {} +/- {}", ytest[62], f64::sqrt(yvar[62]));
}
